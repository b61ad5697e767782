use std::collections::HashMap;
use std::path::PathBuf;

use analysis_core::{AnalysisError, Bar, IntervalLabel, Quote};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::catalog;
use crate::io;
use crate::partition::{bar_partition_path, bar_partitions_in_range, quote_partition_path, quote_partitions_in_range};

/// A closure mapping a UTC instant to the exchange-calendar trading day it
/// belongs to. Sub-daily partitions are keyed on this day, not on the UTC
/// calendar date, so a post-midnight-UTC bar in `Asia/Tokyo` still lands in
/// the same partition as the rest of its session. Callers typically derive
/// this from a `time-service::TimeService`; `columnar-store` stays
/// unaware of trading calendars itself.
pub type DayOf<'a> = dyn Fn(DateTime<Utc>) -> NaiveDate + 'a;

/// A closure mapping a trading day to that day's regular-session
/// `[open, close)` bounds, for `regular_hours_only` reads. Returns `None`
/// for a non-trading day. Like `DayOf`, this keeps calendar knowledge out
/// of `columnar-store` itself; callers derive it from `TimeService`.
pub type RegularHoursOf<'a> = dyn Fn(NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> + 'a;

/// Partitioned Parquet store for bars and quotes (spec §4.2). One
/// `ColumnarStore` per exchange group, rooted at `base_dir/exchange_group`;
/// cheap to construct, holds no open file handles between calls.
pub struct ColumnarStore {
    base_dir: PathBuf,
    exchange_group: String,
}

impl ColumnarStore {
    pub fn new(base_dir: impl Into<PathBuf>, exchange_group: impl Into<String>) -> Self {
        Self { base_dir: base_dir.into(), exchange_group: exchange_group.into() }
    }

    pub fn base_dir(&self) -> &std::path::Path {
        &self.base_dir
    }

    pub fn exchange_group(&self) -> &str {
        &self.exchange_group
    }

    /// Appends `bars` to their partitions, deduplicating on `timestamp`: a
    /// bar for a timestamp already on disk is replaced by the incoming one
    /// (re-fetched/finalized bars override provisional ones).
    pub fn write_bars(
        &self,
        symbol: &str,
        interval: IntervalLabel,
        bars: &[Bar],
        exchange_tz: Tz,
        day_of: &DayOf<'_>,
    ) -> Result<usize, AnalysisError> {
        for bar in bars {
            bar.validate()?;
            if bar.symbol != symbol || bar.interval != interval {
                return Err(AnalysisError::InvalidData(format!(
                    "write_bars: bar for {}/{} does not match requested {symbol}/{interval}",
                    bar.symbol, bar.interval
                )));
            }
        }

        let mut by_partition: HashMap<NaiveDate, Vec<Bar>> = HashMap::new();
        for bar in bars {
            by_partition.entry(day_of(bar.timestamp)).or_default().push(bar.clone());
        }

        let mut written = 0usize;
        for (date, incoming) in by_partition {
            let path = bar_partition_path(&self.base_dir, &self.exchange_group, symbol, interval, date);
            let mut existing = io::read_partition_bars(&path, interval, exchange_tz)?;
            let mut by_ts: HashMap<DateTime<Utc>, Bar> =
                existing.drain(..).map(|b| (b.timestamp, b)).collect();
            for bar in incoming {
                by_ts.insert(bar.timestamp, bar);
            }
            let mut merged: Vec<Bar> = by_ts.into_values().collect();
            merged.sort_by_key(|b| b.timestamp);
            written += merged.len();
            io::write_partition_bars(&path, &merged, exchange_tz)?;
        }
        Ok(written)
    }

    /// Reads bars in the exact instant range `[start, end]`, not merely the
    /// days they fall on. `regular_hours_only`, when true, additionally
    /// drops any bar outside `regular_hours_of`'s session bounds for its day.
    #[allow(clippy::too_many_arguments)]
    pub fn read_bars(
        &self,
        symbol: &str,
        interval: IntervalLabel,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exchange_tz: Tz,
        day_of: &DayOf<'_>,
        regular_hours_only: bool,
        regular_hours_of: Option<&RegularHoursOf<'_>>,
    ) -> Result<Vec<Bar>, AnalysisError> {
        if start > end {
            return Err(AnalysisError::InvalidData(format!("read_bars: start {start} after end {end}")));
        }
        let mut out = Vec::new();
        for path in bar_partitions_in_range(&self.base_dir, &self.exchange_group, symbol, interval, day_of(start), day_of(end)) {
            out.extend(io::read_partition_bars(&path, interval, exchange_tz)?);
        }
        out.retain(|b| b.timestamp >= start && b.timestamp <= end);
        if regular_hours_only {
            if let Some(regular_hours_of) = regular_hours_of {
                out.retain(|b| match regular_hours_of(day_of(b.timestamp)) {
                    Some((open, close)) => b.timestamp >= open && b.timestamp < close,
                    None => false,
                });
            }
        }
        out.sort_by_key(|b| b.timestamp);
        Ok(out)
    }

    pub fn write_quotes(&self, symbol: &str, quotes: &[Quote], exchange_tz: Tz, day_of: &DayOf<'_>) -> Result<usize, AnalysisError> {
        for quote in quotes {
            if quote.symbol != symbol {
                return Err(AnalysisError::InvalidData(format!(
                    "write_quotes: quote for {} does not match requested {symbol}",
                    quote.symbol
                )));
            }
            if !quote.is_valid() {
                return Err(AnalysisError::InvalidData(format!("invalid quote at {}", quote.timestamp)));
            }
        }

        let mut by_partition: HashMap<NaiveDate, Vec<Quote>> = HashMap::new();
        for quote in quotes {
            by_partition.entry(day_of(quote.timestamp)).or_default().push(quote.clone());
        }

        let mut written = 0usize;
        for (date, incoming) in by_partition {
            let path = quote_partition_path(&self.base_dir, &self.exchange_group, symbol, date);
            let mut existing = io::read_partition_quotes(&path, exchange_tz)?;
            let mut by_ts: HashMap<DateTime<Utc>, Quote> =
                existing.drain(..).map(|q| (q.timestamp, q)).collect();
            for quote in incoming {
                by_ts.insert(quote.timestamp, quote);
            }
            let mut merged: Vec<Quote> = by_ts.into_values().collect();
            merged.sort_by_key(|q| q.timestamp);
            written += merged.len();
            io::write_partition_quotes(&path, &merged, exchange_tz)?;
        }
        Ok(written)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn read_quotes(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exchange_tz: Tz,
        day_of: &DayOf<'_>,
        regular_hours_only: bool,
        regular_hours_of: Option<&RegularHoursOf<'_>>,
    ) -> Result<Vec<Quote>, AnalysisError> {
        if start > end {
            return Err(AnalysisError::InvalidData(format!("read_quotes: start {start} after end {end}")));
        }
        let mut out = Vec::new();
        for path in quote_partitions_in_range(&self.base_dir, &self.exchange_group, symbol, day_of(start), day_of(end)) {
            out.extend(io::read_partition_quotes(&path, exchange_tz)?);
        }
        out.retain(|q| q.timestamp >= start && q.timestamp <= end);
        if regular_hours_only {
            if let Some(regular_hours_of) = regular_hours_of {
                out.retain(|q| match regular_hours_of(day_of(q.timestamp)) {
                    Some((open, close)) => q.timestamp >= open && q.timestamp < close,
                    None => false,
                });
            }
        }
        out.sort_by_key(|q| q.timestamp);
        Ok(out)
    }

    pub fn available_symbols(&self) -> Result<Vec<String>, AnalysisError> {
        catalog::available_symbols(&self.base_dir, &self.exchange_group)
    }

    pub fn available_intervals(&self, symbol: &str) -> Result<Vec<IntervalLabel>, AnalysisError> {
        catalog::available_intervals(&self.base_dir, &self.exchange_group, symbol)
    }

    pub fn date_range(&self, symbol: &str, interval: IntervalLabel) -> Result<Option<(NaiveDate, NaiveDate)>, AnalysisError> {
        catalog::date_range(&self.base_dir, &self.exchange_group, symbol, interval)
    }

    /// Deletes stored bars for one (symbol, interval), optionally bounded to
    /// `[start, end]`; `None` on either end means unbounded in that
    /// direction. Returns the number of partition files removed. Quotes
    /// live in a sibling `quotes/` tree, so interval deletion never touches
    /// them.
    pub fn delete_interval(
        &self,
        symbol: &str,
        interval: IntervalLabel,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<usize, AnalysisError> {
        let dir = self.base_dir.join(&self.exchange_group).join("bars").join(interval.to_string()).join(symbol);
        if !dir.exists() {
            return Ok(0);
        }
        let (start, end) = match catalog::date_range(&self.base_dir, &self.exchange_group, symbol, interval)? {
            Some((lo, hi)) => (start.unwrap_or(lo), end.unwrap_or(hi)),
            None => return Ok(0),
        };
        let mut removed = 0usize;
        for path in bar_partitions_in_range(&self.base_dir, &self.exchange_group, symbol, interval, start, end) {
            if path.exists() {
                std::fs::remove_file(&path).map_err(AnalysisError::Io)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Deletes every stored interval and quote history for `symbol`.
    pub fn delete_symbol(&self, symbol: &str) -> Result<(), AnalysisError> {
        let bars_root = self.base_dir.join(&self.exchange_group).join("bars");
        for interval_dir in std::fs::read_dir(&bars_root).into_iter().flatten().flatten() {
            let dir = interval_dir.path().join(symbol);
            if dir.exists() {
                std::fs::remove_dir_all(&dir).map_err(AnalysisError::Io)?;
            }
        }
        let quotes_dir = self.base_dir.join(&self.exchange_group).join("quotes").join(symbol);
        if quotes_dir.exists() {
            std::fs::remove_dir_all(&quotes_dir).map_err(AnalysisError::Io)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use analysis_core::IntervalUnit;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use super::*;

    const TZ: Tz = chrono_tz::US::Eastern;

    fn utc_day(ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&TZ).date_naive()
    }

    fn bar(symbol: &str, interval: IntervalLabel, secs: i64, close: f64) -> Bar {
        let ts = Utc.timestamp_opt(secs, 0).unwrap();
        Bar { symbol: symbol.into(), timestamp: ts, interval, open: close, high: close, low: close, close, volume: 10.0 }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let store = ColumnarStore::new(dir.path(), "us_equity");
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        let bars = vec![
            bar("AAPL", interval, 1_700_000_000, 100.0),
            bar("AAPL", interval, 1_700_000_060, 101.0),
        ];
        store.write_bars("AAPL", interval, &bars, TZ, &utc_day).unwrap();

        let start = bars[0].timestamp - chrono::Duration::seconds(1);
        let end = bars[1].timestamp + chrono::Duration::seconds(1);
        let read = store.read_bars("AAPL", interval, start, end, TZ, &utc_day, false, None).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].close, 100.0);
        assert_eq!(read[1].close, 101.0);
    }

    #[test]
    fn read_bars_is_clipped_to_the_exact_instant_range() {
        let dir = tempdir().unwrap();
        let store = ColumnarStore::new(dir.path(), "us_equity");
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        let bars = vec![
            bar("AAPL", interval, 1_700_000_000, 100.0),
            bar("AAPL", interval, 1_700_000_060, 101.0),
            bar("AAPL", interval, 1_700_000_120, 102.0),
        ];
        store.write_bars("AAPL", interval, &bars, TZ, &utc_day).unwrap();

        let read = store
            .read_bars("AAPL", interval, bars[0].timestamp, bars[1].timestamp, TZ, &utc_day, false, None)
            .unwrap();
        assert_eq!(read.len(), 2, "the third bar, one minute past `end`, must not be included");
    }

    #[test]
    fn append_dedups_by_timestamp() {
        let dir = tempdir().unwrap();
        let store = ColumnarStore::new(dir.path(), "us_equity");
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        let first = vec![bar("AAPL", interval, 1_700_000_000, 100.0)];
        store.write_bars("AAPL", interval, &first, TZ, &utc_day).unwrap();

        let revised = vec![bar("AAPL", interval, 1_700_000_000, 105.0)];
        store.write_bars("AAPL", interval, &revised, TZ, &utc_day).unwrap();

        let ts = first[0].timestamp;
        let read = store
            .read_bars("AAPL", interval, ts - chrono::Duration::seconds(1), ts + chrono::Duration::seconds(1), TZ, &utc_day, false, None)
            .unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].close, 105.0);
    }

    #[test]
    fn catalog_reports_written_symbols_and_intervals() {
        let dir = tempdir().unwrap();
        let store = ColumnarStore::new(dir.path(), "us_equity");
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        store.write_bars("AAPL", interval, &[bar("AAPL", interval, 1_700_000_000, 100.0)], TZ, &utc_day).unwrap();

        assert_eq!(store.available_symbols().unwrap(), vec!["AAPL".to_string()]);
        assert_eq!(store.available_intervals("AAPL").unwrap(), vec![interval]);
        assert!(store.date_range("AAPL", interval).unwrap().is_some());
    }

    #[test]
    fn regular_hours_only_drops_bars_outside_the_session() {
        let dir = tempdir().unwrap();
        let store = ColumnarStore::new(dir.path(), "us_equity");
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        // 04:00 America/New_York: pre-market, outside a 09:30-16:00 session.
        let premarket = TZ.with_ymd_and_hms(2024, 1, 2, 4, 0, 0).unwrap().with_timezone(&Utc);
        let regular = TZ.with_ymd_and_hms(2024, 1, 2, 9, 35, 0).unwrap().with_timezone(&Utc);
        let bars = vec![
            Bar { symbol: "AAPL".into(), timestamp: premarket, interval, open: 1.0, high: 1.0, low: 1.0, close: 1.0, volume: 1.0 },
            Bar { symbol: "AAPL".into(), timestamp: regular, interval, open: 1.0, high: 1.0, low: 1.0, close: 1.0, volume: 1.0 },
        ];
        store.write_bars("AAPL", interval, &bars, TZ, &utc_day).unwrap();

        let regular_hours_of = |date: NaiveDate| {
            Some((
                TZ.from_local_datetime(&date.and_hms_opt(9, 30, 0).unwrap()).single()?.with_timezone(&Utc),
                TZ.from_local_datetime(&date.and_hms_opt(16, 0, 0).unwrap()).single()?.with_timezone(&Utc),
            ))
        };
        let read = store
            .read_bars("AAPL", interval, premarket, regular + chrono::Duration::minutes(1), TZ, &utc_day, true, Some(&regular_hours_of))
            .unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].timestamp, regular);
    }
}
