use std::collections::HashMap;

use analysis_core::IntervalLabel;
use chrono::NaiveDate;
use indicator_framework::IndicatorConfig;

/// Which symbols a `HistoricalConfig` entry applies to.
#[derive(Debug, Clone)]
pub enum ApplyTo {
    All,
    Symbols(Vec<String>),
}

impl ApplyTo {
    pub fn matches(&self, symbol: &str) -> bool {
        match self {
            ApplyTo::All => true,
            ApplyTo::Symbols(list) => list.iter().any(|s| s == symbol),
        }
    }
}

/// One entry of the `historical.data[]` configuration surface (spec §6):
/// load `trailing_days` trading days of `intervals` history for the
/// matching symbols.
#[derive(Debug, Clone)]
pub struct HistoricalConfig {
    pub apply_to: ApplyTo,
    pub trailing_days: usize,
    pub intervals: Vec<IntervalLabel>,
}

/// What a symbol asks to stream: a set of bar intervals (the coordinator
/// picks the smallest as the STREAMED base, per §4.6 Phase 1) plus whether
/// quotes are wanted. Backtest mode ignores a requested `"ticks"` stream,
/// per spec.
#[derive(Debug, Clone, Default)]
pub struct SymbolStreamRequest {
    pub intervals: Vec<IntervalLabel>,
    pub quotes: bool,
    pub ticks: bool,
}

/// The session-level configuration surface (spec §6 "Session" block).
/// `data_api`/`exchange_group`/`asset_class` live one layer up, in the
/// composition root's `EngineConfig` — this is what `SessionCoordinator`
/// itself needs to drive the six phases.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub exchange_group: String,
    pub asset_class: String,
    pub symbols: Vec<String>,
    pub streams: HashMap<String, SymbolStreamRequest>,
    pub historical: Vec<HistoricalConfig>,
    pub historical_indicators: Vec<IndicatorConfig>,
    pub enable_historical_quality: bool,
    /// 0 = data-driven (no sleep between simulated minutes); >0 =
    /// clock-driven, paced at `60/speed_multiplier` seconds per minute.
    pub speed_multiplier: f64,
    pub backtest_start_date: NaiveDate,
    pub backtest_end_date: NaiveDate,
    /// Trailing bar window retained per (symbol, interval) in `SessionState`.
    pub max_bars_per_interval: usize,
}

impl SessionConfig {
    pub fn historical_for(&self, symbol: &str) -> impl Iterator<Item = &HistoricalConfig> {
        self.historical.iter().filter(move |h| h.apply_to.matches(symbol))
    }
}
