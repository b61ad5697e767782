use std::collections::HashMap;

use analysis_core::{AnalysisError, Bar};
use technical_analysis as ta;

use crate::types::{IndicatorConfig, IndicatorValue};

/// `previous_result` is the last value this (symbol, interval, indicator)
/// triple produced, when one exists — calculators that can update
/// incrementally (EMA, OBV, VWAP) use it instead of re-deriving from the
/// full bar window, so evicting old bars from the trailing window doesn't
/// silently reset their running state.
pub type IndicatorCalculator = fn(&[Bar], &IndicatorConfig, Option<&IndicatorValue>) -> Result<IndicatorValue, AnalysisError>;

fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

fn last(series: &[f64], name: &str) -> Result<f64, AnalysisError> {
    series.last().copied().ok_or_else(|| AnalysisError::InsufficientData(format!("{name}: empty result series")))
}

fn calc_sma(bars: &[Bar], cfg: &IndicatorConfig, _previous: Option<&IndicatorValue>) -> Result<IndicatorValue, AnalysisError> {
    Ok(IndicatorValue::Scalar(last(&ta::sma(&closes(bars), cfg.period), "sma")?))
}

/// Incremental EMA: given the prior EMA scalar and the newest close,
/// applies the smoothing step directly rather than recomputing over the
/// whole window. Falls back to a full bootstrap on the first call for a
/// (symbol, interval) pair.
fn calc_ema(bars: &[Bar], cfg: &IndicatorConfig, previous: Option<&IndicatorValue>) -> Result<IndicatorValue, AnalysisError> {
    if let (Some(IndicatorValue::Scalar(prev_ema)), Some(latest)) = (previous, bars.last()) {
        let multiplier = 2.0 / (cfg.period as f64 + 1.0);
        let ema_val = (latest.close - prev_ema) * multiplier + prev_ema;
        return Ok(IndicatorValue::Scalar(ta::finite_or(ema_val, *prev_ema)));
    }
    Ok(IndicatorValue::Scalar(last(&ta::ema(&closes(bars), cfg.period), "ema")?))
}

fn calc_rsi(bars: &[Bar], cfg: &IndicatorConfig, _previous: Option<&IndicatorValue>) -> Result<IndicatorValue, AnalysisError> {
    Ok(IndicatorValue::Scalar(last(&ta::rsi(&closes(bars), cfg.period), "rsi")?))
}

fn calc_macd(bars: &[Bar], cfg: &IndicatorConfig, _previous: Option<&IndicatorValue>) -> Result<IndicatorValue, AnalysisError> {
    let fast = if cfg.period > 0 { cfg.period } else { 12 };
    let slow = cfg.param("slow", 26.0) as usize;
    let signal = cfg.param("signal", 9.0) as usize;
    let result = ta::macd(&closes(bars), fast, slow, signal);
    Ok(IndicatorValue::Macd {
        macd_line: last(&result.macd_line, "macd_line")?,
        signal_line: last(&result.signal_line, "signal_line")?,
        histogram: last(&result.histogram, "histogram")?,
    })
}

fn calc_bollinger(bars: &[Bar], cfg: &IndicatorConfig, _previous: Option<&IndicatorValue>) -> Result<IndicatorValue, AnalysisError> {
    let std_dev = cfg.param("std_dev", 2.0);
    let result = ta::bollinger_bands(&closes(bars), cfg.period, std_dev);
    Ok(IndicatorValue::Bollinger {
        upper: last(&result.upper, "bollinger.upper")?,
        middle: last(&result.middle, "bollinger.middle")?,
        lower: last(&result.lower, "bollinger.lower")?,
    })
}

fn calc_atr(bars: &[Bar], cfg: &IndicatorConfig, _previous: Option<&IndicatorValue>) -> Result<IndicatorValue, AnalysisError> {
    Ok(IndicatorValue::Scalar(last(&ta::atr(bars, cfg.period), "atr")?))
}

fn calc_stochastic(bars: &[Bar], cfg: &IndicatorConfig, _previous: Option<&IndicatorValue>) -> Result<IndicatorValue, AnalysisError> {
    let d_period = cfg.param("smooth", 3.0) as usize;
    let result = ta::stochastic(bars, cfg.period, d_period);
    Ok(IndicatorValue::Stochastic { k: last(&result.k, "stochastic.k")?, d: last(&result.d, "stochastic.d")? })
}

/// Incremental OBV: given the prior OBV scalar, adds or subtracts just the
/// newest bar's volume based on its close versus the one before it, instead
/// of re-walking the whole window on every bar.
fn calc_obv(bars: &[Bar], _cfg: &IndicatorConfig, previous: Option<&IndicatorValue>) -> Result<IndicatorValue, AnalysisError> {
    if let Some(IndicatorValue::Scalar(prev_obv)) = previous {
        if bars.len() >= 2 {
            let (prior, latest) = (&bars[bars.len() - 2], &bars[bars.len() - 1]);
            let new_obv = if latest.close > prior.close {
                prev_obv + latest.volume
            } else if latest.close < prior.close {
                prev_obv - latest.volume
            } else {
                *prev_obv
            };
            return Ok(IndicatorValue::Scalar(new_obv));
        }
    }
    Ok(IndicatorValue::Scalar(last(&ta::obv(bars), "obv")?))
}

fn calc_adx(bars: &[Bar], cfg: &IndicatorConfig, _previous: Option<&IndicatorValue>) -> Result<IndicatorValue, AnalysisError> {
    let result = ta::adx(bars, cfg.period);
    Ok(IndicatorValue::Adx {
        adx: last(&result.adx, "adx")?,
        plus_di: last(&result.plus_di, "adx.plus_di")?,
        minus_di: last(&result.minus_di, "adx.minus_di")?,
    })
}

/// Incremental VWAP: carries the cumulative typical-price-volume and
/// cumulative-volume accumulators forward rather than re-summing the whole
/// trailing window on every bar (that sum would otherwise also reset every
/// time the window evicts its oldest bar).
fn calc_vwap(bars: &[Bar], _cfg: &IndicatorConfig, previous: Option<&IndicatorValue>) -> Result<IndicatorValue, AnalysisError> {
    if let (Some(IndicatorValue::Vwap { cumulative_tpv, cumulative_volume, .. }), Some(latest)) = (previous, bars.last()) {
        let typical_price = (latest.high + latest.low + latest.close) / 3.0;
        let cumulative_tpv = cumulative_tpv + typical_price * latest.volume;
        let cumulative_volume = cumulative_volume + latest.volume;
        let value = if cumulative_volume > 0.0 { cumulative_tpv / cumulative_volume } else { typical_price };
        return Ok(IndicatorValue::Vwap { value: ta::finite_or(value, typical_price), cumulative_tpv, cumulative_volume });
    }

    let mut cumulative_tpv = 0.0;
    let mut cumulative_volume = 0.0;
    for bar in bars {
        let typical_price = (bar.high + bar.low + bar.close) / 3.0;
        cumulative_tpv += typical_price * bar.volume;
        cumulative_volume += bar.volume;
    }
    let value = last(&ta::vwap(bars), "vwap")?;
    Ok(IndicatorValue::Vwap { value, cumulative_tpv, cumulative_volume })
}

fn calc_ichimoku(bars: &[Bar], _cfg: &IndicatorConfig, _previous: Option<&IndicatorValue>) -> Result<IndicatorValue, AnalysisError> {
    let result = ta::ichimoku(bars);
    Ok(IndicatorValue::Ichimoku {
        tenkan_sen: last(&result.tenkan_sen, "ichimoku.tenkan_sen")?,
        kijun_sen: last(&result.kijun_sen, "ichimoku.kijun_sen")?,
        senkou_span_a: result.senkou_span_a.last().copied(),
        senkou_span_b: result.senkou_span_b.last().copied(),
        chikou_span: result.chikou_span.last().copied(),
    })
}

fn calc_fibonacci(bars: &[Bar], cfg: &IndicatorConfig, _previous: Option<&IndicatorValue>) -> Result<IndicatorValue, AnalysisError> {
    let lookback = if cfg.period > 0 { cfg.period } else { 20 };
    let levels = ta::fibonacci_retracement(bars, lookback)
        .ok_or_else(|| AnalysisError::InsufficientData("fibonacci_retracement: insufficient range".into()))?;
    Ok(IndicatorValue::Fibonacci {
        level_236: levels.level_236,
        level_382: levels.level_382,
        level_500: levels.level_500,
        level_618: levels.level_618,
        level_786: levels.level_786,
        swing_high: levels.swing_high,
        swing_low: levels.swing_low,
    })
}

fn calc_keltner(bars: &[Bar], cfg: &IndicatorConfig, _previous: Option<&IndicatorValue>) -> Result<IndicatorValue, AnalysisError> {
    let atr_period = cfg.param("atr_period", cfg.period as f64) as usize;
    let multiplier = cfg.param("multiplier", 2.0);
    let result = ta::keltner_channels(bars, cfg.period, atr_period, multiplier);
    Ok(IndicatorValue::Keltner {
        upper: last(&result.upper, "keltner.upper")?,
        middle: last(&result.middle, "keltner.middle")?,
        lower: last(&result.lower, "keltner.lower")?,
    })
}

fn calc_pivot(bars: &[Bar], _cfg: &IndicatorConfig, _previous: Option<&IndicatorValue>) -> Result<IndicatorValue, AnalysisError> {
    let p = ta::pivot_points(bars).ok_or_else(|| AnalysisError::InsufficientData("pivot_points: no bars".into()))?;
    Ok(IndicatorValue::Pivot { pivot: p.pivot, r1: p.r1, r2: p.r2, r3: p.r3, s1: p.s1, s2: p.s2, s3: p.s3 })
}

fn calc_market_structure(bars: &[Bar], cfg: &IndicatorConfig, _previous: Option<&IndicatorValue>) -> Result<IndicatorValue, AnalysisError> {
    let lookback = if cfg.period > 0 { cfg.period } else { 20 };
    let s = ta::market_structure(bars, lookback);
    Ok(IndicatorValue::MarketStructure {
        higher_highs: s.higher_highs,
        lower_lows: s.lower_lows,
        higher_lows: s.higher_lows,
        lower_highs: s.lower_highs,
    })
}

/// Registry of pure indicator calculators keyed by name, per the
/// framework's design: calculators are stateless functions over a bar
/// window; the evaluator owns the per-(symbol, interval, key) state.
pub struct IndicatorRegistry {
    calculators: HashMap<&'static str, IndicatorCalculator>,
}

impl IndicatorRegistry {
    pub fn with_defaults() -> Self {
        let mut calculators: HashMap<&'static str, IndicatorCalculator> = HashMap::new();
        calculators.insert("sma", calc_sma);
        calculators.insert("ema", calc_ema);
        calculators.insert("rsi", calc_rsi);
        calculators.insert("macd", calc_macd);
        calculators.insert("bollinger", calc_bollinger);
        calculators.insert("atr", calc_atr);
        calculators.insert("stochastic", calc_stochastic);
        calculators.insert("obv", calc_obv);
        calculators.insert("adx", calc_adx);
        calculators.insert("vwap", calc_vwap);
        calculators.insert("ichimoku", calc_ichimoku);
        calculators.insert("fibonacci", calc_fibonacci);
        calculators.insert("keltner", calc_keltner);
        calculators.insert("pivot", calc_pivot);
        calculators.insert("market_structure", calc_market_structure);
        Self { calculators }
    }

    pub fn register(&mut self, name: &'static str, calculator: IndicatorCalculator) {
        self.calculators.insert(name, calculator);
    }

    pub fn get(&self, name: &str) -> Option<IndicatorCalculator> {
        self.calculators.get(name).copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.calculators.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for IndicatorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
