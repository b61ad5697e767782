use std::path::{Path, PathBuf};

use analysis_core::IntervalLabel;
use chrono::{Datelike, NaiveDate};

/// Where a given (symbol, interval, date) lives on disk, per spec §4.2:
/// `<root>/<exchange_group>/bars/<interval>/<symbol>/...`, day-partitioned
/// for sub-daily intervals and year-partitioned for daily/weekly ones so a
/// symbol's whole multi-year daily history fits in one file.
pub fn bar_partition_path(root: &Path, exchange_group: &str, symbol: &str, interval: IntervalLabel, date: NaiveDate) -> PathBuf {
    let dir = root.join(exchange_group).join("bars").join(interval.to_string()).join(symbol);
    if interval.is_sub_daily() {
        dir.join(format!("{}", date.format("%Y")))
            .join(format!("{}", date.format("%m")))
            .join(format!("{}.parquet", date.format("%d")))
    } else {
        dir.join(format!("{}.parquet", date.format("%Y")))
    }
}

/// Quotes are always stored at daily granularity, in a `quotes/` tree that
/// sits alongside `bars/`, never nested under a bar interval's folder:
/// `<root>/<exchange_group>/quotes/<symbol>/<YYYY>/<MM>/<DD>.parquet`.
pub fn quote_partition_path(root: &Path, exchange_group: &str, symbol: &str, date: NaiveDate) -> PathBuf {
    root.join(exchange_group)
        .join("quotes")
        .join(symbol)
        .join(format!("{}", date.format("%Y")))
        .join(format!("{}", date.format("%m")))
        .join(format!("{}.parquet", date.format("%d")))
}

/// Every bar partition file that could hold data overlapping `[start, end]`.
/// Sub-daily intervals need one path per day; daily/weekly intervals need
/// one path per year.
pub fn bar_partitions_in_range(
    root: &Path,
    exchange_group: &str,
    symbol: &str,
    interval: IntervalLabel,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if interval.is_sub_daily() {
        let mut date = start;
        while date <= end {
            paths.push(bar_partition_path(root, exchange_group, symbol, interval, date));
            date = date.succ_opt().expect("date overflow while enumerating partitions");
        }
    } else {
        for year in start.year()..=end.year() {
            paths.push(bar_partition_path(
                root,
                exchange_group,
                symbol,
                interval,
                NaiveDate::from_ymd_opt(year, 1, 1).unwrap(),
            ));
        }
    }
    paths
}

/// Every quote partition file that could hold data overlapping `[start, end]`.
pub fn quote_partitions_in_range(root: &Path, exchange_group: &str, symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut date = start;
    while date <= end {
        paths.push(quote_partition_path(root, exchange_group, symbol, date));
        date = date.succ_opt().expect("date overflow while enumerating partitions");
    }
    paths
}
