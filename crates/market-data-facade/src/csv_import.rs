use std::path::Path;

use analysis_core::{AnalysisError, Bar, IntervalLabel};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::types::{CsvImportOptions, ImportSummary};

const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "date", "datetime", "time"];
const OPEN_ALIASES: &[&str] = &["open", "o"];
const HIGH_ALIASES: &[&str] = &["high", "h"];
const LOW_ALIASES: &[&str] = &["low", "l"];
const CLOSE_ALIASES: &[&str] = &["close", "c"];
const VOLUME_ALIASES: &[&str] = &["volume", "v", "vol"];

struct ColumnMap {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

fn find_column(headers: &csv::StringRecord, aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|h| aliases.iter().any(|a| h.trim().eq_ignore_ascii_case(a)))
}

fn detect_columns(headers: &csv::StringRecord) -> Result<ColumnMap, AnalysisError> {
    let missing = |name: &str| AnalysisError::InvalidData(format!("CSV header is missing a '{name}' column"));
    Ok(ColumnMap {
        timestamp: find_column(headers, TIMESTAMP_ALIASES).ok_or_else(|| missing("timestamp"))?,
        open: find_column(headers, OPEN_ALIASES).ok_or_else(|| missing("open"))?,
        high: find_column(headers, HIGH_ALIASES).ok_or_else(|| missing("high"))?,
        low: find_column(headers, LOW_ALIASES).ok_or_else(|| missing("low"))?,
        close: find_column(headers, CLOSE_ALIASES).ok_or_else(|| missing("close"))?,
        volume: find_column(headers, VOLUME_ALIASES).ok_or_else(|| missing("volume"))?,
    })
}

/// Accepts RFC3339, `"%Y-%m-%d %H:%M:%S"`, and bare `"%Y-%m-%d"` (midnight UTC).
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AnalysisError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()));
    }
    Err(AnalysisError::InvalidData(format!("unparseable timestamp: {raw}")))
}

/// Reads `path` and parses it into `Bar`s for `symbol`/`interval`, applying
/// header auto-detection and optional date-range filtering. Rows outside
/// `options`'s date range, or that fail OHLCV validation, are skipped and
/// counted rather than aborting the whole import.
pub fn parse_csv_bars(
    path: &Path,
    symbol: &str,
    interval: IntervalLabel,
    options: &CsvImportOptions,
) -> Result<(Vec<Bar>, ImportSummary), AnalysisError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| AnalysisError::Io(std::io::Error::other(e.to_string())))?;
    let headers = reader.headers().map_err(|e| AnalysisError::Io(std::io::Error::other(e.to_string())))?.clone();
    let columns = detect_columns(&headers)?;

    let mut bars = Vec::new();
    let mut total_rows = 0usize;
    let mut skipped = 0usize;

    for record in reader.records() {
        let record = record.map_err(|e| AnalysisError::Io(std::io::Error::other(e.to_string())))?;
        total_rows += 1;

        let parsed = (|| -> Result<Bar, AnalysisError> {
            let timestamp = parse_timestamp(&record[columns.timestamp])?;
            let parse_f64 = |idx: usize| -> Result<f64, AnalysisError> {
                record[idx].trim().parse::<f64>().map_err(|_| AnalysisError::InvalidData(format!("non-numeric field: {}", &record[idx])))
            };
            Ok(Bar {
                symbol: symbol.to_string(),
                timestamp,
                interval,
                open: parse_f64(columns.open)?,
                high: parse_f64(columns.high)?,
                low: parse_f64(columns.low)?,
                close: parse_f64(columns.close)?,
                volume: parse_f64(columns.volume)?,
            })
        })();

        let bar = match parsed {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("skipping unparseable CSV row {}: {}", total_rows, e);
                skipped += 1;
                continue;
            }
        };

        if let Some(start) = options.date_start {
            if bar.timestamp < start {
                skipped += 1;
                continue;
            }
        }
        if let Some(end) = options.date_end {
            if bar.timestamp > end {
                skipped += 1;
                continue;
            }
        }
        if let Err(e) = bar.validate() {
            tracing::warn!("skipping invalid bar at row {}: {}", total_rows, e);
            skipped += 1;
            continue;
        }

        bars.push(bar);
    }

    let imported = bars.len();
    Ok((
        bars,
        ImportSummary {
            symbol: symbol.to_string(),
            total_rows,
            imported,
            skipped,
        },
    ))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use analysis_core::IntervalUnit;
    use tempfile::NamedTempFile;

    use super::*;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn detects_headers_case_insensitively() {
        let f = write_csv("Date,Open,High,Low,Close,Volume\n2024-01-02,1,2,0.5,1.5,100\n");
        let (bars, summary) = parse_csv_bars(f.path(), "AAPL", IntervalLabel::new(1, IntervalUnit::Day), &CsvImportOptions::default()).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.skipped, 0);
    }

    #[test]
    fn filters_by_date_range() {
        let f = write_csv("timestamp,open,high,low,close,volume\n2024-01-01,1,1,1,1,1\n2024-06-01,1,1,1,1,1\n");
        let opts = CsvImportOptions {
            date_start: Some(parse_timestamp("2024-03-01").unwrap()),
            date_end: None,
        };
        let (bars, summary) = parse_csv_bars(f.path(), "AAPL", IntervalLabel::new(1, IntervalUnit::Day), &opts).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn skips_invalid_ohlc_rows() {
        let f = write_csv("timestamp,open,high,low,close,volume\n2024-01-01,5,1,1,1,1\n");
        let (bars, summary) = parse_csv_bars(f.path(), "AAPL", IntervalLabel::new(1, IntervalUnit::Day), &CsvImportOptions::default()).unwrap();
        assert!(bars.is_empty());
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn missing_column_is_an_error() {
        let f = write_csv("timestamp,open,high,low,volume\n2024-01-01,1,1,1,1\n");
        let err = parse_csv_bars(f.path(), "AAPL", IntervalLabel::new(1, IntervalUnit::Day), &CsvImportOptions::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidData(_)));
    }
}
