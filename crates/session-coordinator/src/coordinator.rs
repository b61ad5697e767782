use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use analysis_core::{AnalysisError, IntervalLabel};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use indicator_framework::{IndicatorConfig, IndicatorEvaluator};
use market_data_facade::MarketDataFacade;
use parking_lot::{Condvar, Mutex, RwLock};
use quality_engine::QualityReport;
use replay_queue::{CancellationToken, ReplayEvent, ReplayQueueCoordinator, StreamKind};
use session_state::{AppendMode, SessionState};
use time_service::{BacktestTimeInput, TimeService};

use crate::config::{SessionConfig, SymbolStreamRequest};
use crate::derive::DerivedAggregator;
use crate::historical::{load_historical, SymbolHistoricalSummary};
use crate::stream_plan::{self, SymbolStreamPlan};

/// A symbol whose catchup is still pending, requested by a caller outside
/// the coordinator's own thread (spec §4.6: mid-session symbol addition).
struct PendingAddition {
    symbol: String,
    request: SymbolStreamRequest,
}

/// A simple settable/waitable gate for the coordinator's pause state,
/// mirroring `replay_queue::CancellationToken`'s condvar pattern but
/// two-valued (paused/running) rather than one-shot.
struct PauseGate {
    paused: Mutex<bool>,
    condvar: Condvar,
}

impl PauseGate {
    fn new() -> Self {
        Self { paused: Mutex::new(false), condvar: Condvar::new() }
    }

    fn pause(&self) {
        *self.paused.lock() = true;
    }

    fn resume(&self) {
        *self.paused.lock() = false;
        self.condvar.notify_all();
    }

    fn wait_while_paused(&self, stop: &CancellationToken) {
        let mut guard = self.paused.lock();
        while *guard && !stop.is_cancelled() {
            self.condvar.wait(&mut guard);
        }
    }
}

/// The six-phase trading-session state machine (spec §4.6), composing
/// `TimeService`, `ColumnarStore`/`MarketDataFacade`, `SessionState`,
/// `ReplayQueueCoordinator`, `QualityEngine`, and `IndicatorEvaluator`.
/// One coordinator drives one backtest window or one live session; the
/// composition root (`market-data-cli`) owns its construction.
pub struct SessionCoordinator {
    facade: Arc<MarketDataFacade>,
    time: Arc<TimeService>,
    state: Arc<SessionState>,
    replay: Arc<ReplayQueueCoordinator>,
    indicators: Arc<IndicatorEvaluator>,
    config: SessionConfig,
    exchange_tz: Tz,
    plans: RwLock<HashMap<String, SymbolStreamPlan>>,
    live_indicators: Vec<IndicatorConfig>,
    pause: PauseGate,
    stop: CancellationToken,
    pending: Mutex<Vec<PendingAddition>>,
    /// Current-session quality, keyed by (symbol, interval). Recomputed on
    /// every bar dispatch; `quality-engine` itself is stateless.
    live_quality: RwLock<HashMap<(String, IntervalLabel), QualityReport>>,
    trading_days_completed: Mutex<u32>,
}

impl SessionCoordinator {
    pub fn new(
        facade: Arc<MarketDataFacade>,
        time: Arc<TimeService>,
        state: Arc<SessionState>,
        replay: Arc<ReplayQueueCoordinator>,
        indicators: Arc<IndicatorEvaluator>,
        config: SessionConfig,
        live_indicators: Vec<IndicatorConfig>,
    ) -> Result<Self, AnalysisError> {
        let exchange_tz = time.market_timezone(&config.exchange_group)?;
        Ok(Self {
            facade,
            time,
            state,
            replay,
            indicators,
            config,
            exchange_tz,
            plans: RwLock::new(HashMap::new()),
            live_indicators,
            pause: PauseGate::new(),
            stop: CancellationToken::new(),
            pending: Mutex::new(Vec::new()),
            live_quality: RwLock::new(HashMap::new()),
            trading_days_completed: Mutex::new(0),
        })
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn request_stop(&self) {
        self.stop.cancel();
        self.pause.resume();
    }

    pub fn trading_days_completed(&self) -> u32 {
        *self.trading_days_completed.lock()
    }

    pub fn live_quality(&self, symbol: &str, interval: IntervalLabel) -> Option<QualityReport> {
        self.live_quality.read().get(&(symbol.to_string(), interval)).cloned()
    }

    /// Mid-session symbol addition (spec §4.6): enqueued here and drained
    /// between streaming-phase iterations so the clock and other symbols'
    /// visibility are undisturbed until catchup completes.
    pub fn request_add_symbol(&self, symbol: impl Into<String>, request: SymbolStreamRequest) {
        self.pending.lock().push(PendingAddition { symbol: symbol.into(), request });
    }

    /// Runs trading days from `config.backtest_start_date` until
    /// `config.backtest_end_date` is exceeded or `request_stop` is called.
    /// Phase 1 (stream-plan determination) runs once; every other phase
    /// repeats per trading day.
    pub fn run_backtest(&self) -> Result<(), AnalysisError> {
        *self.plans.write() = stream_plan::determine(&self.config, self.time.mode());
        tracing::info!(symbols = self.config.symbols.len(), "session coordinator: stream plan determined");

        let mut current_date = self.config.backtest_start_date;
        loop {
            if self.stop.is_cancelled() {
                break;
            }
            if current_date > self.config.backtest_end_date {
                break;
            }

            self.time.set_backtest_time(BacktestTimeInput::Naive(current_date.and_hms_opt(0, 0, 0).unwrap()))?;
            self.run_one_session(current_date)?;
            *self.trading_days_completed.lock() += 1;

            current_date = match self.time.next_trading_date(current_date, 1) {
                Ok(d) => d,
                Err(AnalysisError::InvariantViolation(_)) => break,
                Err(e) => return Err(e),
            };
        }
        Ok(())
    }

    fn run_one_session(&self, date: chrono::NaiveDate) -> Result<(), AnalysisError> {
        tracing::info!(%date, "phase 2: historical management");
        let plans = self.plans.read().clone();
        let historical: HashMap<String, SymbolHistoricalSummary> =
            load_historical(&self.facade, &self.time, &self.state, &self.config, self.exchange_tz, date, &plans)?;
        for (symbol, summary) in &historical {
            if let Some(mean) = summary.mean_completeness() {
                tracing::info!(symbol, dates = summary.dates_loaded.len(), mean_completeness = mean, "historical quality");
            }
        }

        tracing::info!(%date, "phase 3: queue loading");
        let session = self.time.trading_session(date, &self.config.exchange_group, &self.config.asset_class);
        if !session.is_trading_day {
            tracing::info!(%date, "not a trading day, skipping session");
            return Ok(());
        }
        let open = session.regular_open_at().ok_or_else(|| AnalysisError::InvariantViolation(format!("{date}: trading day with no regular open")))?.with_timezone(&Utc);
        let close = session.regular_close_at().ok_or_else(|| AnalysisError::InvariantViolation(format!("{date}: trading day with no regular close")))?.with_timezone(&Utc);

        self.load_queues_for_day(&plans, date, open, close)?;

        tracing::info!(%date, "phase 4: session activation");
        for symbol in &self.config.symbols {
            self.state.activate_session(symbol, date);
        }

        tracing::info!(%date, "phase 5: streaming");
        self.run_streaming_phase(&plans, open, close)?;

        tracing::info!(%date, "phase 6: end of session");
        for symbol in &self.config.symbols {
            self.state.deactivate_session(symbol);
        }

        Ok(())
    }

    fn load_queues_for_day(&self, plans: &HashMap<String, SymbolStreamPlan>, date: chrono::NaiveDate, open: DateTime<Utc>, close: DateTime<Utc>) -> Result<(), AnalysisError> {
        for (symbol, plan) in plans {
            if !self.config.symbols.contains(symbol) {
                continue;
            }
            if let Some(base) = plan.streamed_base {
                self.replay.register_stream(symbol, StreamKind::Bar(base));
                let bars = self.facade.get_bars(symbol, base, open, close, false)?;
                let events = bars.into_iter().map(ReplayEvent::Bar).collect::<Vec<_>>();
                if events.is_empty() {
                    tracing::error!(symbol, %date, %base, "missing STREAMED bar data for trading day");
                    return Err(AnalysisError::DataUnavailable(format!("{symbol}: no {base} bars for {date}")));
                }
                self.replay.feed_stream(symbol, StreamKind::Bar(base), events)?;
            }
            if plan.stream_quotes {
                self.replay.register_stream(symbol, StreamKind::Quote);
                match self.facade.get_quotes(symbol, open, close, false) {
                    Ok(quotes) => {
                        let events = quotes.into_iter().map(ReplayEvent::Quote).collect();
                        self.replay.feed_stream(symbol, StreamKind::Quote, events)?;
                    }
                    Err(e) => tracing::warn!(symbol, %date, error = %e, "quotes unavailable, degrading gracefully"),
                }
            }
        }
        Ok(())
    }

    fn run_streaming_phase(&self, plans: &HashMap<String, SymbolStreamPlan>, open: DateTime<Utc>, close: DateTime<Utc>) -> Result<(), AnalysisError> {
        let mut derive_aggs: HashMap<(String, IntervalLabel), DerivedAggregator> = HashMap::new();
        for (symbol, plan) in plans {
            for &derived in &plan.generated {
                derive_aggs.insert((symbol.clone(), derived), DerivedAggregator::new(symbol.clone(), derived));
            }
        }

        loop {
            self.drain_pending_additions(plans, open, close)?;
            self.pause.wait_while_paused(&self.stop);
            if self.stop.is_cancelled() {
                break;
            }

            if self.replay.queue_stats().iter().all(|(_, _, size)| *size == 0) {
                break;
            }

            let Some(event) = self.replay.next_event(&self.stop) else {
                break;
            };
            let ts = event.timestamp();
            if ts < open || ts > close {
                continue;
            }

            self.time.set_backtest_time(BacktestTimeInput::Aware(ts))?;
            self.dispatch_event(&event, open, &mut derive_aggs)?;

            if self.config.speed_multiplier > 0.0 {
                let seconds_per_minute = (60.0 / self.config.speed_multiplier).min(60.0);
                std::thread::sleep(StdDuration::from_secs_f64(seconds_per_minute / 60.0));
            }
        }

        for ((symbol, _interval), mut agg) in derive_aggs {
            if let Some(bar) = agg.finalize() {
                self.state.append_bar(&symbol, bar, AppendMode::Stream)?;
            }
        }
        Ok(())
    }

    fn dispatch_event(&self, event: &ReplayEvent, session_open: DateTime<Utc>, derive_aggs: &mut HashMap<(String, IntervalLabel), DerivedAggregator>) -> Result<(), AnalysisError> {
        let symbol = event.symbol().to_string();
        if let ReplayEvent::Bar(bar) = event {
            self.state.append_bar(&symbol, bar.clone(), AppendMode::Stream)?;

            let base_report = self.recompute_quality(&symbol, bar.interval, session_open)?;
            self.recompute_indicators(&symbol, bar.interval)?;

            for ((agg_symbol, derived_interval), agg) in derive_aggs.iter_mut() {
                if agg_symbol != &symbol {
                    continue;
                }
                if let Some(derived_bar) = agg.push(bar) {
                    self.state.append_bar(&symbol, derived_bar, AppendMode::Stream)?;
                    if let Some(base_report) = &base_report {
                        self.propagate_quality(&symbol, *derived_interval, base_report);
                    }
                    self.recompute_indicators(&symbol, *derived_interval)?;
                }
            }
        }
        Ok(())
    }

    /// Current-session quality (spec §4.7): expected = floor((now-open)/interval).
    /// Returns the freshly scored report so callers deriving a coarser
    /// interval from this one can propagate its level rather than rescoring.
    fn recompute_quality(&self, symbol: &str, interval: IntervalLabel, session_open: DateTime<Utc>) -> Result<Option<QualityReport>, AnalysisError> {
        let now = self.time.current_time(None).with_timezone(&Utc);
        let step = chrono::Duration::seconds(interval.as_seconds());
        let mut expected = Vec::new();
        let mut ts = session_open;
        while ts < now {
            expected.push(ts);
            ts += step;
        }
        let report = self.state.with_bars_ref(symbol, interval, true, |bars| quality_engine::score(symbol, interval, expected, bars, true));
        if let Some(report) = &report {
            self.live_quality.write().insert((symbol.to_string(), interval), report.clone());
        }
        Ok(report)
    }

    /// Sets a derived interval's live quality equal to its base interval's
    /// (spec §4.7): derived bars are a deterministic function of the base,
    /// so they inherit its quality level rather than being scored afresh.
    fn propagate_quality(&self, symbol: &str, derived_interval: IntervalLabel, base: &QualityReport) {
        let report = QualityReport {
            symbol: symbol.to_string(),
            interval: derived_interval,
            expected: base.expected,
            observed: base.observed,
            completeness: base.completeness,
            level: quality_engine::propagate_to_derived(base.level),
            gaps: base.gaps.clone(),
        };
        self.live_quality.write().insert((symbol.to_string(), derived_interval), report);
    }

    fn recompute_indicators(&self, symbol: &str, interval: IntervalLabel) -> Result<(), AnalysisError> {
        for cfg in &self.live_indicators {
            let result = self.state.with_bars_ref(symbol, interval, true, |bars| self.indicators.evaluate(symbol, interval, bars, cfg));
            if let Some(Err(e)) = result {
                tracing::warn!(symbol, %interval, indicator = %cfg.name, error = %e, "indicator evaluation failed");
            }
        }
        Ok(())
    }

    /// Drains mid-session symbol-addition requests: pauses the stream,
    /// loads the new symbol's historical context and current-day queue,
    /// catches up all bars strictly before the clock with the clock held
    /// fixed, then resumes. The new symbol alone is gated inactive during
    /// catchup; other symbols' visibility is unaffected.
    fn drain_pending_additions(&self, plans: &HashMap<String, SymbolStreamPlan>, open: DateTime<Utc>, close: DateTime<Utc>) -> Result<(), AnalysisError> {
        let additions: Vec<PendingAddition> = std::mem::take(&mut self.pending.lock());
        if additions.is_empty() {
            return Ok(());
        }
        self.pause.pause();

        for addition in additions {
            let symbol = addition.symbol;
            self.state.deactivate_session(&symbol);

            let mut one_symbol_config = self.config.clone();
            one_symbol_config.symbols = vec![symbol.clone()];
            one_symbol_config.streams.insert(symbol.clone(), addition.request.clone());
            let mut one_symbol_plans = HashMap::new();
            let plan = plans.get(&symbol).cloned().unwrap_or_else(|| {
                let mut built = stream_plan::determine(&one_symbol_config, self.time.mode());
                built.remove(&symbol).unwrap_or(SymbolStreamPlan { streamed_base: None, generated: Vec::new(), stream_quotes: false, stream_ticks: false })
            });
            one_symbol_plans.insert(symbol.clone(), plan.clone());

            let today = self.time.current_time(Some(self.exchange_tz)).date_naive();
            load_historical(&self.facade, &self.time, &self.state, &one_symbol_config, self.exchange_tz, today, &one_symbol_plans)?;

            if let Some(base) = plan.streamed_base {
                self.replay.register_stream(&symbol, StreamKind::Bar(base));
                let now = self.time.current_time(None).with_timezone(&Utc);
                let bars = self.facade.get_bars(&symbol, base, open, now.min(close), false)?;
                for bar in bars {
                    if bar.timestamp < now {
                        if bar.timestamp >= open && bar.timestamp <= close {
                            self.state.append_bar(&symbol, bar, AppendMode::Stream)?;
                        }
                    }
                }
            }

            self.state.activate_session(&symbol, today);
        }

        self.pause.resume();
        Ok(())
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub fn indicators(&self) -> &Arc<IndicatorEvaluator> {
        &self.indicators
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use analysis_core::IntervalUnit;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use columnar_store::ColumnarStore;
    use indicator_framework::IndicatorRegistry;
    use market_data_facade::MarketDataFacade;
    use time_service::{Holiday, MarketHoursConfig, TimeMode};

    use super::*;
    use crate::config::{ApplyTo, HistoricalConfig, SymbolStreamRequest};

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
            regular_close: NaiveTime::from_hms_opt(9, 40, 0).unwrap(),
            post_open: NaiveTime::from_hms_opt(9, 40, 0).unwrap(),
            post_close: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        }
    }

    /// Writes ten 1-minute bars for `symbol` spanning the 09:30-09:40 test
    /// session, so `run_backtest` has exactly one trading day of queued data.
    fn seed_bars(store: &ColumnarStore, symbol: &str) {
        let open = TZ.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap().with_timezone(&Utc);
        let bars: Vec<analysis_core::Bar> = (0..10)
            .map(|i| analysis_core::Bar {
                symbol: symbol.to_string(),
                timestamp: open + chrono::Duration::minutes(i),
                interval: IntervalLabel::new(1, IntervalUnit::Minute),
                open: 100.0 + i as f64,
                high: 101.0 + i as f64,
                low: 99.0 + i as f64,
                close: 100.5 + i as f64,
                volume: 1000.0,
            })
            .collect();
        let day_of = |ts: DateTime<Utc>| ts.with_timezone(&TZ).date_naive();
        store.write_bars(symbol, IntervalLabel::new(1, IntervalUnit::Minute), &bars, TZ, &day_of).unwrap();
    }

    fn harness(symbol: &str) -> (tempfile::TempDir, SessionCoordinator) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ColumnarStore::new(dir.path(), "us_equity"));
        seed_bars(&store, symbol);

        let time = Arc::new(TimeService::new(
            TimeMode::Backtest,
            TZ,
            vec![market_hours()],
            Vec::<Holiday>::new(),
            "us_equity",
            "equity",
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        ));
        let facade = Arc::new(MarketDataFacade::new(store.clone(), time.clone(), None, "us_equity", "equity").unwrap());
        let state = Arc::new(SessionState::new(1000));
        let replay = Arc::new(ReplayQueueCoordinator::new());
        let indicators = Arc::new(IndicatorEvaluator::new(IndicatorRegistry::with_defaults()));

        let mut streams = HashMap::new();
        streams.insert(
            symbol.to_string(),
            SymbolStreamRequest { intervals: vec![IntervalLabel::new(1, IntervalUnit::Minute), IntervalLabel::new(5, IntervalUnit::Minute)], quotes: false, ticks: false },
        );
        let config = SessionConfig {
            exchange_group: "us_equity".to_string(),
            asset_class: "equity".to_string(),
            symbols: vec![symbol.to_string()],
            streams,
            historical: vec![HistoricalConfig { apply_to: ApplyTo::All, trailing_days: 1, intervals: vec![IntervalLabel::new(1, IntervalUnit::Minute)] }],
            historical_indicators: Vec::new(),
            enable_historical_quality: false,
            speed_multiplier: 0.0,
            backtest_start_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            backtest_end_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            max_bars_per_interval: 1000,
        };

        let coordinator = SessionCoordinator::new(facade, time, state, replay, indicators, config, Vec::new()).unwrap();
        (dir, coordinator)
    }

    #[test]
    fn run_backtest_streams_base_bars_and_derives_the_coarser_interval() {
        let (_dir, coordinator) = harness("AAPL");
        coordinator.run_backtest().unwrap();

        assert_eq!(coordinator.trading_days_completed(), 1);

        let base_count = coordinator.state().with_bars_ref("AAPL", IntervalLabel::new(1, IntervalUnit::Minute), true, |bars| bars.len()).unwrap();
        assert_eq!(base_count, 10, "all ten minute bars for the session should have streamed");

        let derived_count = coordinator.state().with_bars_ref("AAPL", IntervalLabel::new(5, IntervalUnit::Minute), true, |bars| bars.len()).unwrap();
        assert_eq!(derived_count, 2, "ten 1-minute bars should aggregate into two complete 5-minute bars");

        let base_quality = coordinator.live_quality("AAPL", IntervalLabel::new(1, IntervalUnit::Minute)).unwrap();
        let derived_quality = coordinator.live_quality("AAPL", IntervalLabel::new(5, IntervalUnit::Minute)).unwrap();
        assert_eq!(derived_quality.level, base_quality.level, "derived-interval quality should be propagated from the base interval, not rescored");
    }

    #[test]
    fn request_stop_halts_the_backtest_loop() {
        let (_dir, coordinator) = harness("AAPL");
        coordinator.request_stop();
        coordinator.run_backtest().unwrap();
        assert_eq!(coordinator.trading_days_completed(), 0, "a pre-cancelled coordinator should not complete any trading day");
    }

    #[test]
    fn mid_session_symbol_addition_is_queued_and_drained_without_disturbing_the_active_symbol() {
        let (dir, coordinator) = harness("AAPL");
        seed_bars(&ColumnarStore::new(dir.path(), "us_equity"), "MSFT");
        coordinator.request_add_symbol("MSFT", SymbolStreamRequest { intervals: vec![IntervalLabel::new(1, IntervalUnit::Minute)], quotes: false, ticks: false });
        coordinator.run_backtest().unwrap();

        assert_eq!(coordinator.trading_days_completed(), 1);
        let aapl_count = coordinator.state().with_bars_ref("AAPL", IntervalLabel::new(1, IntervalUnit::Minute), true, |bars| bars.len()).unwrap();
        assert_eq!(aapl_count, 10, "the originally-configured symbol's stream is unaffected by a mid-session addition");
    }
}
