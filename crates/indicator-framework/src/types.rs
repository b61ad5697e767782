use std::collections::HashMap;

use analysis_core::IntervalLabel;
use serde::{Deserialize, Serialize};

/// A requested indicator: its name (registry key), primary period, and any
/// secondary parameters (e.g. MACD's slow/signal periods, Bollinger's
/// standard-deviation multiplier).
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    pub name: String,
    pub period: usize,
    pub params: HashMap<String, f64>,
}

impl IndicatorConfig {
    pub fn new(name: impl Into<String>, period: usize) -> Self {
        Self { name: name.into(), period, params: HashMap::new() }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn param(&self, key: &str, default: f64) -> f64 {
        self.params.get(key).copied().unwrap_or(default)
    }

    /// `"{name}_{period}_{interval}"`, or `"{name}_{interval}"` when the
    /// indicator has no meaningful period (e.g. OBV, VWAP).
    pub fn state_key(&self, interval: IntervalLabel) -> String {
        if self.period == 0 {
            format!("{}_{}", self.name, interval)
        } else {
            format!("{}_{}_{}", self.name, self.period, interval)
        }
    }
}

/// The last computed value of an indicator, keeping each indicator's
/// natural shape rather than flattening everything to a scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum IndicatorValue {
    Scalar(f64),
    /// VWAP's running accumulators, carried forward so each new bar updates
    /// the average in O(1) instead of re-summing the whole trailing window.
    Vwap { value: f64, cumulative_tpv: f64, cumulative_volume: f64 },
    Macd { macd_line: f64, signal_line: f64, histogram: f64 },
    Bollinger { upper: f64, middle: f64, lower: f64 },
    Stochastic { k: f64, d: f64 },
    Adx { adx: f64, plus_di: f64, minus_di: f64 },
    Ichimoku {
        tenkan_sen: f64,
        kijun_sen: f64,
        senkou_span_a: Option<f64>,
        senkou_span_b: Option<f64>,
        chikou_span: Option<f64>,
    },
    Fibonacci {
        level_236: f64,
        level_382: f64,
        level_500: f64,
        level_618: f64,
        level_786: f64,
        swing_high: f64,
        swing_low: f64,
    },
    Keltner { upper: f64, middle: f64, lower: f64 },
    Pivot { pivot: f64, r1: f64, r2: f64, r3: f64, s1: f64, s2: f64, s3: f64 },
    MarketStructure { higher_highs: usize, lower_lows: usize, higher_lows: usize, lower_highs: usize },
}

/// Minimum bar count before an indicator's output is trustworthy, per the
/// formulas named in the framework's design: MACD needs its slow EMA plus
/// signal smoothing to settle; DEMA/TEMA need multiples of their period to
/// shed seed bias; swing-based indicators need lookback on both sides.
pub fn warmup_bars(config: &IndicatorConfig) -> usize {
    match config.name.as_str() {
        "macd" => 26,
        "tema" => 3 * config.period,
        "dema" => 2 * config.period,
        "stochastic" => config.period + config.param("smooth", 3.0) as usize,
        "ultimate_oscillator" => 28,
        "rsi" | "atr" => config.period + 1,
        "support_resistance" | "market_structure" => 2 * config.period + 1,
        "ichimoku" => 52,
        _ => config.period.max(1),
    }
}
