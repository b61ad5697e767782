use std::path::Path;
use std::sync::Arc;

use analysis_core::{AnalysisError, Bar, IntervalLabel, MarketDataProvider, Quote, Tick};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use columnar_store::{aggregate_quotes_by_second, aggregate_ticks_to_1s, ColumnarStore};
use time_service::{TimeMode, TimeService};

use crate::csv_import::parse_csv_bars;
use crate::types::{CsvImportOptions, ImportSummary, QualitySnapshot};

/// Uniform query/import API over `ColumnarStore` and a `MarketDataProvider`,
/// mode-aware per spec §4.3. One facade is constructed per process and
/// shared by `Arc` from the composition root.
pub struct MarketDataFacade {
    store: Arc<ColumnarStore>,
    time: Arc<TimeService>,
    provider: Option<Arc<dyn MarketDataProvider>>,
    exchange_group: String,
    asset_class: String,
    exchange_tz: Tz,
}

/// Integer-vs-label interval normalization from spec §4.3: a bare integer is
/// minutes; the literal token `"tick"` is rewritten to `"1s"`.
pub fn normalize_interval(raw: &str) -> Result<IntervalLabel, AnalysisError> {
    IntervalLabel::normalize(raw)
}

impl MarketDataFacade {
    pub fn new(
        store: Arc<ColumnarStore>,
        time: Arc<TimeService>,
        provider: Option<Arc<dyn MarketDataProvider>>,
        exchange_group: &str,
        asset_class: &str,
    ) -> Result<Self, AnalysisError> {
        let exchange_tz = time.market_timezone(exchange_group)?;
        Ok(Self {
            store,
            time,
            provider,
            exchange_group: exchange_group.to_string(),
            asset_class: asset_class.to_string(),
            exchange_tz,
        })
    }

    /// Maps a UTC instant to the exchange-local trading day it falls in,
    /// for `ColumnarStore`'s partition keys.
    fn day_of(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.exchange_tz).date_naive()
    }

    /// Regular-session `[open, close)` bounds for a trading day, derived
    /// from `TimeService`'s calendar; `None` on a non-trading day or one
    /// with no configured hours.
    fn regular_hours_of(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let session = self.time.trading_session(date, &self.exchange_group, &self.asset_class);
        let open = session.regular_open_at()?.with_timezone(&Utc);
        let close = session.regular_close_at()?.with_timezone(&Utc);
        Some((open, close))
    }

    fn require_provider(&self) -> Result<&Arc<dyn MarketDataProvider>, AnalysisError> {
        self.provider
            .as_ref()
            .ok_or_else(|| AnalysisError::Configuration("no market data provider configured".into()))
    }

    /// In backtest mode, range queries are clamped to `current_time()`: a
    /// caller can't read bars the simulated clock hasn't reached yet.
    fn clamp_to_current_time(&self, end: DateTime<Utc>) -> DateTime<Utc> {
        if self.time.mode() == TimeMode::Backtest {
            let now = self.time.current_time(None).with_timezone(&Utc);
            end.min(now)
        } else {
            end
        }
    }

    pub fn get_bars(
        &self,
        symbol: &str,
        interval: IntervalLabel,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        regular_hours_only: bool,
    ) -> Result<Vec<Bar>, AnalysisError> {
        let end = self.clamp_to_current_time(end);
        if start > end {
            return Ok(Vec::new());
        }
        let day_of = |ts: DateTime<Utc>| self.day_of(ts);
        let regular_hours_of = |date: NaiveDate| self.regular_hours_of(date);
        self.store.read_bars(
            symbol,
            interval,
            start,
            end,
            self.exchange_tz,
            &day_of,
            regular_hours_only,
            Some(&regular_hours_of),
        )
    }

    pub fn get_latest_bar(&self, symbol: &str, interval: IntervalLabel) -> Result<Option<Bar>, AnalysisError> {
        if self.time.mode() == TimeMode::Live {
            let provider = self.require_provider()?;
            return futures_lite_block_on(provider.fetch_latest_bar(symbol, interval));
        }
        let now = self.time.current_time(None).with_timezone(&Utc);
        let day_start = self.day_of(now).and_hms_opt(0, 0, 0).unwrap();
        let start = self.exchange_tz.from_local_datetime(&day_start).single().unwrap_or(now.with_timezone(&self.exchange_tz)).with_timezone(&Utc);
        let bars = self.get_bars(symbol, interval, start, now, false)?;
        Ok(bars.into_iter().last())
    }

    pub fn get_quotes(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        regular_hours_only: bool,
    ) -> Result<Vec<Quote>, AnalysisError> {
        let end = self.clamp_to_current_time(end);
        if start > end {
            return Ok(Vec::new());
        }
        let day_of = |ts: DateTime<Utc>| self.day_of(ts);
        let regular_hours_of = |date: NaiveDate| self.regular_hours_of(date);
        self.store.read_quotes(
            symbol,
            start,
            end,
            self.exchange_tz,
            &day_of,
            regular_hours_only,
            Some(&regular_hours_of),
        )
    }

    pub fn get_latest_quote(&self, symbol: &str) -> Result<Option<Quote>, AnalysisError> {
        let now = self.time.current_time(None).with_timezone(&Utc);
        let quotes = self.get_quotes(symbol, now - chrono::Duration::minutes(5), now, false)?;
        Ok(quotes.into_iter().last())
    }

    /// Raw ticks are never persisted (spec §3): backtest reads synthesize a
    /// tick-shaped view from the 1s bars they were aggregated into (price =
    /// close, size = volume); live mode proxies straight to the provider.
    pub fn get_ticks(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Tick>, AnalysisError> {
        if self.time.mode() == TimeMode::Live {
            let provider = self.require_provider()?;
            return futures_lite_block_on(provider.fetch_ticks(symbol, start, end));
        }
        let one_second = IntervalLabel::new(1, analysis_core::IntervalUnit::Second);
        let bars = self.get_bars(symbol, one_second, start, end, false)?;
        Ok(bars
            .into_iter()
            .map(|b| Tick {
                symbol: b.symbol,
                timestamp: b.timestamp,
                price: b.close,
                size: b.volume,
            })
            .collect())
    }

    pub fn get_latest_tick(&self, symbol: &str) -> Result<Option<Tick>, AnalysisError> {
        let now = self.time.current_time(None).with_timezone(&Utc);
        let ticks = self.get_ticks(symbol, now - chrono::Duration::minutes(5), now)?;
        Ok(ticks.into_iter().last())
    }

    pub fn import_csv(&self, path: &Path, symbol: &str, interval: IntervalLabel, options: &CsvImportOptions) -> Result<ImportSummary, AnalysisError> {
        let (bars, summary) = parse_csv_bars(path, symbol, interval, options)?;
        let day_of = |ts: DateTime<Utc>| self.day_of(ts);
        self.store.write_bars(symbol, interval, &bars, self.exchange_tz, &day_of)?;
        tracing::info!("CSV import complete: {} bars imported for {}", summary.imported, symbol);
        Ok(summary)
    }

    pub fn import_from_api(&self, data_type: &str, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<ImportSummary, AnalysisError> {
        let provider = self.require_provider()?;
        let day_of = |ts: DateTime<Utc>| self.day_of(ts);
        let normalized = data_type.to_lowercase();

        if normalized == "tick" || normalized == "ticks" {
            let ticks = futures_lite_block_on(provider.fetch_ticks(symbol, start, end))?;
            let bars = aggregate_ticks_to_1s(&ticks)?;
            let one_second = IntervalLabel::new(1, analysis_core::IntervalUnit::Second);
            let imported = self.store.write_bars(symbol, one_second, &bars, self.exchange_tz, &day_of)?;
            return Ok(ImportSummary { symbol: symbol.to_string(), total_rows: ticks.len(), imported, skipped: 0 });
        }

        if normalized == "quote" || normalized == "quotes" {
            let quotes = futures_lite_block_on(provider.fetch_quotes(symbol, start, end))?;
            let aggregated = aggregate_quotes_by_second(&quotes)?;
            let imported = self.store.write_quotes(symbol, &aggregated, self.exchange_tz, &day_of)?;
            return Ok(ImportSummary { symbol: symbol.to_string(), total_rows: quotes.len(), imported, skipped: 0 });
        }

        let interval = normalize_interval(&normalized)?;
        let bars = futures_lite_block_on(provider.fetch_bars(symbol, interval, start, end))?;
        let imported = self.store.write_bars(symbol, interval, &bars, self.exchange_tz, &day_of)?;
        Ok(ImportSummary { symbol: symbol.to_string(), total_rows: bars.len(), imported, skipped: 0 })
    }

    /// Naive quality snapshot (duplicate-timestamp count, date range);
    /// `quality-engine`'s calendar-aware scoring is what the session
    /// coordinator uses for actual gap detection.
    pub fn check_data_quality(&self, symbol: &str, interval: IntervalLabel) -> Result<QualitySnapshot, AnalysisError> {
        let Some((start, end)) = self.store.date_range(symbol, interval)? else {
            return Ok(QualitySnapshot { total_bars: 0, duplicate_timestamps: 0, quality_score: 0.0, date_range: None });
        };
        let day_of = |ts: DateTime<Utc>| self.day_of(ts);
        let start_instant = self.exchange_tz.from_local_datetime(&start.and_hms_opt(0, 0, 0).unwrap()).single().unwrap().with_timezone(&Utc);
        let end_instant = self.exchange_tz.from_local_datetime(&end.and_hms_opt(23, 59, 59).unwrap()).single().unwrap().with_timezone(&Utc);
        let bars = self.store.read_bars(symbol, interval, start_instant, end_instant, self.exchange_tz, &day_of, false, None)?;
        let mut seen = std::collections::HashSet::new();
        let duplicates = bars.iter().filter(|b| !seen.insert(b.timestamp)).count();
        let quality_score = if duplicates == 0 { 1.0 } else { 0.95 };
        let date_range = match (bars.first(), bars.last()) {
            (Some(f), Some(l)) => Some((f.timestamp, l.timestamp)),
            _ => None,
        };
        Ok(QualitySnapshot { total_bars: bars.len(), duplicate_timestamps: duplicates, quality_score, date_range })
    }
}

/// The facade's public API is synchronous (it is called from the
/// plain-threaded session-coordinator, not from async tasks); provider
/// calls are the only async edge, so they are driven to completion on a
/// throwaway single-threaded runtime rather than colouring this whole
/// crate's API async.
fn futures_lite_block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to start a runtime for a blocking provider call")
        .block_on(fut)
}
