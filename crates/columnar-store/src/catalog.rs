use std::path::Path;

use analysis_core::{AnalysisError, IntervalLabel};
use chrono::NaiveDate;

fn read_dir_names(dir: &Path) -> Result<Vec<String>, AnalysisError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(AnalysisError::Io)? {
        let entry = entry.map_err(AnalysisError::Io)?;
        if entry.file_type().map_err(AnalysisError::Io)?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn bars_root(root: &Path, exchange_group: &str) -> std::path::PathBuf {
    root.join(exchange_group).join("bars")
}

/// Every symbol with at least one stored bar interval, scanned across
/// `bars/<interval>/<symbol>` since there is no flat symbol index.
pub fn available_symbols(root: &Path, exchange_group: &str) -> Result<Vec<String>, AnalysisError> {
    let mut symbols = std::collections::BTreeSet::new();
    for interval_dir in read_dir_names(&bars_root(root, exchange_group))? {
        for symbol in read_dir_names(&bars_root(root, exchange_group).join(&interval_dir))? {
            symbols.insert(symbol);
        }
    }
    Ok(symbols.into_iter().collect())
}

pub fn available_intervals(root: &Path, exchange_group: &str, symbol: &str) -> Result<Vec<IntervalLabel>, AnalysisError> {
    let mut intervals = Vec::new();
    for interval_dir in read_dir_names(&bars_root(root, exchange_group))? {
        if bars_root(root, exchange_group).join(&interval_dir).join(symbol).exists() {
            if let Ok(interval) = interval_dir.parse() {
                intervals.push(interval);
            }
        }
    }
    intervals.sort_by_key(|i: &IntervalLabel| i.as_seconds());
    Ok(intervals)
}

/// Earliest and latest partition date present for a (symbol, interval),
/// inferred from partition file names rather than their contents (cheap: no
/// parquet footers are read). Sub-daily intervals nest `<YYYY>/<MM>/<DD>.ext`
/// three levels deep; daily-or-coarser intervals store one `<YYYY>.ext` file.
pub fn date_range(
    root: &Path,
    exchange_group: &str,
    symbol: &str,
    interval: IntervalLabel,
) -> Result<Option<(NaiveDate, NaiveDate)>, AnalysisError> {
    let dir = bars_root(root, exchange_group).join(interval.to_string()).join(symbol);
    if !dir.exists() {
        return Ok(None);
    }
    let mut dates = Vec::new();
    if interval.is_sub_daily() {
        for year in read_dir_names(&dir)? {
            let year_dir = dir.join(&year);
            for month in read_dir_names(&year_dir)? {
                let month_dir = year_dir.join(&month);
                for entry in std::fs::read_dir(&month_dir).map_err(AnalysisError::Io)? {
                    let entry = entry.map_err(AnalysisError::Io)?;
                    let path = entry.path();
                    let Some(day) = path.file_stem().and_then(|s| s.to_str()) else { continue };
                    if let Ok(date) = NaiveDate::parse_from_str(&format!("{year}-{month}-{day}"), "%Y-%m-%d") {
                        dates.push(date);
                    }
                }
            }
        }
    } else {
        for entry in std::fs::read_dir(&dir).map_err(AnalysisError::Io)? {
            let entry = entry.map_err(AnalysisError::Io)?;
            let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()).map(str::to_string) else { continue };
            if let Ok(year) = stem.parse::<i32>() {
                dates.push(NaiveDate::from_ymd_opt(year, 1, 1).unwrap());
                dates.push(NaiveDate::from_ymd_opt(year, 12, 31).unwrap());
            }
        }
    }
    if dates.is_empty() {
        return Ok(None);
    }
    Ok(Some((*dates.iter().min().unwrap(), *dates.iter().max().unwrap())))
}
