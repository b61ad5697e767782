use std::collections::HashMap;
use std::path::PathBuf;

use analysis_core::{AnalysisError, IntervalLabel};
use chrono::NaiveDate;
use indicator_framework::IndicatorConfig;
use serde::Deserialize;
use session_coordinator::{ApplyTo, HistoricalConfig, SessionConfig, SymbolStreamRequest};
use time_service::{Holiday, MarketHoursConfig};

/// Which market-data provider backs live queries and `import from API`.
/// `indicator_framework::IndicatorConfig` and `session_coordinator::SessionConfig`
/// have no serde derive (their parsed `IntervalLabel`/`HashMap<String, f64>`
/// fields aren't meant to round-trip through a wire format), so this module's
/// types are the TOML-facing mirrors the composition root converts from.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataApi {
    #[default]
    None,
    Polygon,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BacktestToml {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub speed_multiplier: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamRequestToml {
    pub intervals: Vec<String>,
    #[serde(default)]
    pub quotes: bool,
    #[serde(default)]
    pub ticks: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoricalToml {
    /// Absent or omitted means "all configured symbols".
    #[serde(default)]
    pub symbols: Option<Vec<String>>,
    pub trailing_days: usize,
    pub intervals: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_bars() -> usize {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorConfigToml {
    pub name: String,
    #[serde(default)]
    pub period: usize,
    #[serde(default)]
    pub params: HashMap<String, f64>,
}

impl From<IndicatorConfigToml> for IndicatorConfig {
    fn from(toml: IndicatorConfigToml) -> Self {
        let mut cfg = IndicatorConfig::new(toml.name, toml.period);
        cfg.params = toml.params;
        cfg
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionToml {
    pub symbols: Vec<String>,
    #[serde(default)]
    pub streams: HashMap<String, StreamRequestToml>,
    #[serde(default)]
    pub historical: Vec<HistoricalToml>,
    #[serde(default)]
    pub historical_indicators: Vec<IndicatorConfigToml>,
    #[serde(default)]
    pub live_indicators: Vec<IndicatorConfigToml>,
    #[serde(default = "default_true")]
    pub enable_historical_quality: bool,
    #[serde(default = "default_max_bars")]
    pub max_bars_per_interval: usize,
}

/// The full configuration surface (spec §6): storage location, exchange
/// calendar, provider selection, and the backtest/session declarations
/// `SessionCoordinator` needs. Loaded once at startup and treated as
/// immutable (Design Notes §9).
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub exchange_group: String,
    pub asset_class: String,
    pub storage_dir: PathBuf,
    #[serde(default)]
    pub data_api: DataApi,
    /// Env var holding the provider API key; defaults to `POLYGON_API_KEY`.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    pub market_hours: Vec<MarketHoursConfig>,
    #[serde(default)]
    pub holidays: Vec<Holiday>,
    pub backtest: BacktestToml,
    pub session: SessionToml,
}

fn default_api_key_env() -> String {
    "POLYGON_API_KEY".to_string()
}

impl EngineConfig {
    pub fn live_indicators(&self) -> Vec<IndicatorConfig> {
        self.session.live_indicators.iter().cloned().map(IndicatorConfig::from).collect()
    }

    /// Converts the TOML session surface into the typed `SessionConfig`
    /// `SessionCoordinator` drives, parsing every interval label string
    /// through `IntervalLabel::normalize` so `"5"`/`"5m"`/`"tick"` are all
    /// accepted the way the facade's CLI-facing API accepts them.
    pub fn build_session_config(&self) -> Result<SessionConfig, AnalysisError> {
        let mut streams = HashMap::new();
        for (symbol, req) in &self.session.streams {
            let intervals = req
                .intervals
                .iter()
                .map(|s| IntervalLabel::normalize(s))
                .collect::<Result<Vec<_>, _>>()?;
            streams.insert(symbol.clone(), SymbolStreamRequest { intervals, quotes: req.quotes, ticks: req.ticks });
        }

        let mut historical = Vec::with_capacity(self.session.historical.len());
        for entry in &self.session.historical {
            let intervals = entry
                .intervals
                .iter()
                .map(|s| IntervalLabel::normalize(s))
                .collect::<Result<Vec<_>, _>>()?;
            let apply_to = match &entry.symbols {
                Some(list) => ApplyTo::Symbols(list.clone()),
                None => ApplyTo::All,
            };
            historical.push(HistoricalConfig { apply_to, trailing_days: entry.trailing_days, intervals });
        }

        let historical_indicators = self.session.historical_indicators.iter().cloned().map(IndicatorConfig::from).collect();

        Ok(SessionConfig {
            exchange_group: self.exchange_group.clone(),
            asset_class: self.asset_class.clone(),
            symbols: self.session.symbols.clone(),
            streams,
            historical,
            historical_indicators,
            enable_historical_quality: self.session.enable_historical_quality,
            speed_multiplier: self.backtest.speed_multiplier,
            backtest_start_date: self.backtest.start_date,
            backtest_end_date: self.backtest.end_date,
            max_bars_per_interval: self.session.max_bars_per_interval,
        })
    }
}
