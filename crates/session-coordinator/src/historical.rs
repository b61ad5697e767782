use std::collections::HashMap;

use analysis_core::{AnalysisError, Bar, IntervalLabel};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use market_data_facade::MarketDataFacade;
use quality_engine::QualityReport;
use session_state::{AppendMode, SessionState};
use time_service::TimeService;

use crate::config::SessionConfig;
use crate::derive::DerivedAggregator;
use crate::stream_plan::SymbolStreamPlan;

/// Per-symbol Phase 2 result: the trading dates loaded and, if historical
/// quality was requested, one `QualityReport` per loaded date for the
/// symbol's streamed base interval. `quality-engine` doesn't have a slot
/// inside `SessionState` for this (it was built without one), so the
/// coordinator keeps it alongside its own phase bookkeeping instead.
#[derive(Debug, Clone, Default)]
pub struct SymbolHistoricalSummary {
    pub dates_loaded: Vec<NaiveDate>,
    pub quality_reports: Vec<QualityReport>,
}

impl SymbolHistoricalSummary {
    /// Arithmetic mean completeness across loaded dates, per spec §4.6
    /// Phase 2 ("aggregate as the arithmetic mean across dates").
    pub fn mean_completeness(&self) -> Option<f64> {
        if self.quality_reports.is_empty() {
            return None;
        }
        let sum: f64 = self.quality_reports.iter().map(|r| r.completeness).sum();
        Some(sum / self.quality_reports.len() as f64)
    }
}

fn day_bounds(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = tz.from_local_datetime(&date.and_hms_opt(0, 0, 0).unwrap()).single().unwrap_or_else(|| tz.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()));
    let end = tz
        .from_local_datetime(&date.and_hms_opt(23, 59, 59).unwrap())
        .single()
        .unwrap_or_else(|| tz.from_utc_datetime(&date.and_hms_opt(23, 59, 59).unwrap()));
    (start.with_timezone(&Utc), end.with_timezone(&Utc))
}

/// The last `trailing_days` trading dates on or before `end`. Scans a
/// generous calendar window to absorb weekends/holidays rather than
/// threading exchange-specific gap assumptions through here.
fn trailing_trading_dates(time: &TimeService, end: NaiveDate, trailing_days: usize) -> Result<Vec<NaiveDate>, AnalysisError> {
    let lookback = end - Duration::days(trailing_days as i64 * 3 + 14);
    let mut dates = time.trading_dates_in_range(lookback, end)?;
    if dates.len() > trailing_days {
        dates = dates.split_off(dates.len() - trailing_days);
    }
    Ok(dates)
}

/// Phase 2: loads trailing historical bars for every symbol's configured
/// `historical.data[]` entries, appends them to `SessionState` under
/// `AppendMode::Historical`, optionally scores per-date quality for the
/// streamed base interval, and synthesizes derived-interval historical
/// bars from 1-minute history.
pub fn load_historical(
    facade: &MarketDataFacade,
    time: &TimeService,
    state: &SessionState,
    config: &SessionConfig,
    exchange_tz: Tz,
    current_date: NaiveDate,
    plans: &HashMap<String, SymbolStreamPlan>,
) -> Result<HashMap<String, SymbolHistoricalSummary>, AnalysisError> {
    let end_date = current_date.pred_opt().ok_or_else(|| AnalysisError::InvariantViolation("date underflow computing historical window".into()))?;
    let mut summaries = HashMap::new();

    for symbol in &config.symbols {
        let mut summary = SymbolHistoricalSummary::default();
        let plan = plans.get(symbol);

        for hist_cfg in config.historical_for(symbol) {
            let dates = trailing_trading_dates(time, end_date, hist_cfg.trailing_days)?;
            summary.dates_loaded = dates.clone();

            for &interval in &hist_cfg.intervals {
                let mut per_date_bars: Vec<(NaiveDate, Vec<Bar>)> = Vec::with_capacity(dates.len());
                for &date in &dates {
                    let (start, end) = day_bounds(date, exchange_tz);
                    let bars = facade.get_bars(symbol, interval, start, end, false)?;
                    state.add_bars_batch(symbol, bars.clone(), AppendMode::Historical)?;
                    per_date_bars.push((date, bars));
                }

                let is_base = plan.and_then(|p| p.streamed_base) == Some(interval);
                let mut base_reports = Vec::new();
                if config.enable_historical_quality && is_base {
                    for (date, bars) in &per_date_bars {
                        let session = time.trading_session(*date, &config.exchange_group, &config.asset_class);
                        if let Some(report) = score_day(symbol, interval, &session, bars) {
                            summary.quality_reports.push(report.clone());
                            base_reports.push(report);
                        }
                    }
                }

                if is_base && interval == IntervalLabel::new(1, analysis_core::IntervalUnit::Minute) {
                    let generated = plan.map(|p| p.generated.clone()).unwrap_or_default();
                    for derived in generated {
                        synthesize_derived_historical(state, symbol, derived, &per_date_bars)?;
                        if config.enable_historical_quality {
                            for base_report in &base_reports {
                                summary.quality_reports.push(propagate_derived_report(derived, base_report));
                            }
                        }
                    }
                }
            }
        }

        summaries.insert(symbol.clone(), summary);
    }

    Ok(summaries)
}

fn score_day(symbol: &str, interval: IntervalLabel, session: &time_service::TradingSession, bars: &[Bar]) -> Option<QualityReport> {
    let (open, close) = (session.regular_open_at()?, session.regular_close_at()?);
    let step = chrono::Duration::seconds(interval.as_seconds());
    let mut expected = Vec::new();
    let mut ts = open.with_timezone(&Utc);
    let close_utc = close.with_timezone(&Utc);
    while ts < close_utc {
        expected.push(ts);
        ts += step;
    }
    Some(quality_engine::score(symbol, interval, expected, bars, false))
}

/// Builds a derived-interval `QualityReport` by propagating the base
/// interval's quality level, per spec §4.7: a derived bar is a
/// deterministic function of its base bars, so its quality inherits theirs
/// directly rather than being scored against its own expected cadence.
fn propagate_derived_report(derived_interval: IntervalLabel, base: &QualityReport) -> QualityReport {
    QualityReport {
        symbol: base.symbol.clone(),
        interval: derived_interval,
        expected: base.expected,
        observed: base.observed,
        completeness: base.completeness,
        level: quality_engine::propagate_to_derived(base.level),
        gaps: base.gaps.clone(),
    }
}

fn synthesize_derived_historical(state: &SessionState, symbol: &str, derived_interval: IntervalLabel, per_date_bars: &[(NaiveDate, Vec<Bar>)]) -> Result<(), AnalysisError> {
    for (_, day_bars) in per_date_bars {
        let mut aggregator = DerivedAggregator::new(symbol, derived_interval);
        let mut derived_bars = Vec::new();
        for bar in day_bars {
            if let Some(done) = aggregator.push(bar) {
                derived_bars.push(done);
            }
        }
        if let Some(done) = aggregator.finalize() {
            derived_bars.push(done);
        }
        state.add_bars_batch(symbol, derived_bars, AppendMode::Historical)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use analysis_core::IntervalUnit;
    use chrono::NaiveTime;
    use columnar_store::ColumnarStore;
    use market_data_facade::MarketDataFacade;
    use time_service::{Holiday, MarketHoursConfig, TimeMode};

    use super::*;
    use crate::config::{ApplyTo, HistoricalConfig, SessionConfig};
    use crate::stream_plan::SymbolStreamPlan;

    const TZ: chrono_tz::Tz = chrono_tz::US::Eastern;

    fn market_hours() -> MarketHoursConfig {
        MarketHoursConfig {
            exchange_group: "us_equity".to_string(),
            asset_class: "equity".to_string(),
            timezone: TZ,
            weekday_mask: [false, true, true, true, true, true, false],
            pre_open: NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            pre_close: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            regular_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            regular_close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            post_open: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            post_close: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        }
    }

    fn harness() -> (tempfile::TempDir, Arc<TimeService>, MarketDataFacade) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ColumnarStore::new(dir.path(), "us_equity"));
        let time = Arc::new(TimeService::new(
            TimeMode::Backtest,
            TZ,
            vec![market_hours()],
            Vec::<Holiday>::new(),
            "us_equity",
            "equity",
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        ));
        let facade = MarketDataFacade::new(store.clone(), time.clone(), None, "us_equity", "equity").unwrap();
        (dir, time, facade)
    }

    fn write_minute_bars(store_dir: &std::path::Path, symbol: &str, date: NaiveDate, count: i64) {
        let store = ColumnarStore::new(store_dir, "us_equity");
        let (open, _) = day_bounds(date, TZ);
        let bars: Vec<Bar> = (0..count)
            .map(|i| Bar {
                symbol: symbol.to_string(),
                timestamp: open + Duration::minutes(i),
                interval: IntervalLabel::new(1, IntervalUnit::Minute),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.5,
                volume: 1000.0,
            })
            .collect();
        let day_of = |ts: DateTime<Utc>| ts.with_timezone(&TZ).date_naive();
        store.write_bars(symbol, IntervalLabel::new(1, IntervalUnit::Minute), &bars, TZ, &day_of).unwrap();
    }

    fn base_session_config(symbol: &str) -> SessionConfig {
        SessionConfig {
            exchange_group: "us_equity".to_string(),
            asset_class: "equity".to_string(),
            symbols: vec![symbol.to_string()],
            streams: HashMap::new(),
            historical: vec![HistoricalConfig { apply_to: ApplyTo::All, trailing_days: 3, intervals: vec![IntervalLabel::new(1, IntervalUnit::Minute)] }],
            historical_indicators: Vec::new(),
            enable_historical_quality: true,
            speed_multiplier: 1.0,
            backtest_start_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            backtest_end_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            max_bars_per_interval: 1000,
        }
    }

    #[test]
    fn loads_trailing_bars_into_session_state_under_historical_mode() {
        let (dir, time, facade) = harness();
        let state = SessionState::new(1000);
        let symbol = "AAPL";
        let config = base_session_config(symbol);

        // current_date is Jan 4 (Thu); trailing window should pick up Jan 2 (Tue) and Jan 3 (Wed).
        write_minute_bars(dir.path(), symbol, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 5);
        write_minute_bars(dir.path(), symbol, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(), 5);

        let mut plans = HashMap::new();
        plans.insert(symbol.to_string(), SymbolStreamPlan { streamed_base: Some(IntervalLabel::new(1, IntervalUnit::Minute)), generated: Vec::new(), stream_quotes: false, stream_ticks: false });

        let summaries = load_historical(&facade, &time, &state, &config, TZ, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(), &plans).unwrap();

        let summary = &summaries[symbol];
        assert_eq!(summary.dates_loaded.len(), 2);
        let loaded = state.get_historical_bars(symbol, 30, IntervalLabel::new(1, IntervalUnit::Minute)).len();
        assert_eq!(loaded, 10);
    }

    #[test]
    fn quality_is_scored_only_for_the_streamed_base_interval() {
        let (dir, time, facade) = harness();
        let state = SessionState::new(1000);
        let symbol = "AAPL";
        let config = base_session_config(symbol);

        write_minute_bars(dir.path(), symbol, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 5);

        // streamed_base is 5-minute, so the loaded 1-minute interval is NOT the base and should not be scored.
        let mut plans = HashMap::new();
        plans.insert(symbol.to_string(), SymbolStreamPlan { streamed_base: Some(IntervalLabel::new(5, IntervalUnit::Minute)), generated: Vec::new(), stream_quotes: false, stream_ticks: false });

        let mut config = config;
        config.historical[0].intervals = vec![IntervalLabel::new(1, IntervalUnit::Minute)];
        let summaries = load_historical(&facade, &time, &state, &config, TZ, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(), &plans).unwrap();

        assert!(summaries[symbol].quality_reports.is_empty());
    }

    #[test]
    fn derived_interval_quality_is_propagated_from_the_base_interval() {
        let (dir, time, facade) = harness();
        let state = SessionState::new(1000);
        let symbol = "AAPL";
        let config = base_session_config(symbol);

        write_minute_bars(dir.path(), symbol, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 5);
        write_minute_bars(dir.path(), symbol, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(), 5);

        let five_min = IntervalLabel::new(5, IntervalUnit::Minute);
        let mut plans = HashMap::new();
        plans.insert(symbol.to_string(), SymbolStreamPlan { streamed_base: Some(IntervalLabel::new(1, IntervalUnit::Minute)), generated: vec![five_min], stream_quotes: false, stream_ticks: false });

        let summaries = load_historical(&facade, &time, &state, &config, TZ, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(), &plans).unwrap();

        let base_interval = IntervalLabel::new(1, IntervalUnit::Minute);
        let base_reports: Vec<_> = summaries[symbol].quality_reports.iter().filter(|r| r.interval == base_interval).collect();
        let derived_reports: Vec<_> = summaries[symbol].quality_reports.iter().filter(|r| r.interval == five_min).collect();
        assert_eq!(derived_reports.len(), base_reports.len(), "every base report should have a matching derived-interval report");
        for (base, derived) in base_reports.iter().zip(derived_reports.iter()) {
            assert_eq!(derived.level, base.level, "derived quality must equal the base interval's level, not be rescored");
            assert_eq!(derived.completeness, base.completeness);
        }
    }

    #[test]
    fn mean_completeness_is_none_with_no_reports() {
        let summary = SymbolHistoricalSummary::default();
        assert_eq!(summary.mean_completeness(), None);
    }

    #[test]
    fn mean_completeness_averages_across_dates() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap();
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        let mut summary = SymbolHistoricalSummary::default();
        // first report: 0 observed of 1 expected (completeness 0.0).
        summary.quality_reports.push(quality_engine::score("AAPL", interval, vec![ts], &[], false));
        // second report: 1 observed of 1 expected (completeness 1.0).
        summary.quality_reports.push(quality_engine::score(
            "AAPL",
            interval,
            vec![ts],
            &[Bar { symbol: "AAPL".to_string(), timestamp: ts, interval, open: 1.0, high: 1.0, low: 1.0, close: 1.0, volume: 0.0 }],
            false,
        ));
        assert_eq!(summary.mean_completeness(), Some(0.5));
    }
}
