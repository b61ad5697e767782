use std::collections::HashMap;

use analysis_core::{AnalysisError, Bar, IntervalLabel};
use parking_lot::RwLock;

use crate::registry::IndicatorRegistry;
use crate::types::{warmup_bars, IndicatorConfig, IndicatorValue};

type StateKey = (String, IntervalLabel, String);

/// Registry-backed evaluator that gates output on warm-up and remembers
/// the last value computed for each (symbol, interval, indicator) triple.
/// One evaluator per `SessionCoordinator`, shared across symbols.
pub struct IndicatorEvaluator {
    registry: IndicatorRegistry,
    state: RwLock<HashMap<StateKey, IndicatorValue>>,
}

impl IndicatorEvaluator {
    pub fn new(registry: IndicatorRegistry) -> Self {
        Self { registry, state: RwLock::new(HashMap::new()) }
    }

    /// Evaluates `config` against `bars` (expected sorted ascending,
    /// trailing window for the symbol/interval). Returns `Ok(None)` when
    /// the window hasn't reached warm-up length yet; this is not an error,
    /// just "no opinion yet".
    pub fn evaluate(
        &self,
        symbol: &str,
        interval: IntervalLabel,
        bars: &[Bar],
        config: &IndicatorConfig,
    ) -> Result<Option<IndicatorValue>, AnalysisError> {
        let calculator = self
            .registry
            .get(&config.name)
            .ok_or_else(|| AnalysisError::Configuration(format!("unknown indicator: {}", config.name)))?;

        let required = warmup_bars(config);
        if bars.len() < required {
            tracing::debug!(
                symbol,
                %interval,
                indicator = %config.name,
                have = bars.len(),
                need = required,
                "indicator not warmed up"
            );
            return Ok(None);
        }

        let key = (symbol.to_string(), interval, config.state_key(interval));
        let previous = self.state.read().get(&key).cloned();
        let value = calculator(bars, config, previous.as_ref())?;
        self.state.write().insert(key, value.clone());
        Ok(Some(value))
    }

    pub fn last_value(&self, symbol: &str, interval: IntervalLabel, config: &IndicatorConfig) -> Option<IndicatorValue> {
        let key = (symbol.to_string(), interval, config.state_key(interval));
        self.state.read().get(&key).cloned()
    }

    pub fn clear_symbol(&self, symbol: &str) {
        self.state.write().retain(|(s, _, _), _| s != symbol);
    }

    pub fn registry(&self) -> &IndicatorRegistry {
        &self.registry
    }
}

impl Default for IndicatorEvaluator {
    fn default() -> Self {
        Self::new(IndicatorRegistry::with_defaults())
    }
}

#[cfg(test)]
mod tests {
    use analysis_core::IntervalUnit;
    use chrono::{TimeZone, Utc};

    use super::*;

    fn bar(i: i64, close: f64) -> Bar {
        Bar {
            symbol: "AAPL".into(),
            timestamp: Utc.timestamp_opt(1_700_000_000 + i * 60, 0).unwrap(),
            interval: IntervalLabel::new(1, IntervalUnit::Minute),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn returns_none_before_warmup() {
        let evaluator = IndicatorEvaluator::default();
        let bars: Vec<Bar> = (0..5).map(|i| bar(i, 100.0 + i as f64)).collect();
        let config = IndicatorConfig::new("sma", 20);
        let result = evaluator
            .evaluate("AAPL", IntervalLabel::new(1, IntervalUnit::Minute), &bars, &config)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn computes_and_caches_once_warmed_up() {
        let evaluator = IndicatorEvaluator::default();
        let bars: Vec<Bar> = (0..20).map(|i| bar(i, 100.0 + i as f64)).collect();
        let config = IndicatorConfig::new("sma", 20);
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        let result = evaluator.evaluate("AAPL", interval, &bars, &config).unwrap();
        assert!(result.is_some());
        assert_eq!(evaluator.last_value("AAPL", interval, &config), result);
    }

    #[test]
    fn unknown_indicator_errors() {
        let evaluator = IndicatorEvaluator::default();
        let bars: Vec<Bar> = (0..5).map(|i| bar(i, 100.0)).collect();
        let config = IndicatorConfig::new("not_a_real_indicator", 5);
        let result = evaluator.evaluate("AAPL", IntervalLabel::new(1, IntervalUnit::Minute), &bars, &config);
        assert!(result.is_err());
    }

    /// Feeding bars one at a time (as the coordinator does) must match a
    /// single full-window evaluation, proving the incremental EMA path
    /// agrees with the bootstrap path rather than drifting from it.
    #[test]
    fn incremental_ema_matches_a_full_window_recompute() {
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        let config = IndicatorConfig::new("ema", 5);
        let all_bars: Vec<Bar> = (0..15).map(|i| bar(i, 100.0 + i as f64)).collect();

        let stepwise = IndicatorEvaluator::default();
        let mut last = None;
        for n in 1..=all_bars.len() {
            last = stepwise.evaluate("AAPL", interval, &all_bars[..n], &config).unwrap();
        }

        let one_shot = IndicatorEvaluator::default();
        let expected = one_shot.evaluate("AAPL", interval, &all_bars, &config).unwrap();

        assert_eq!(last, expected);
    }

    /// OBV must keep accruing from its last value even after the window
    /// supplied to `evaluate` has been truncated (bars evicted from the
    /// trailing cap) — it should not silently reset to a fresh bootstrap.
    #[test]
    fn obv_survives_window_truncation() {
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        let config = IndicatorConfig::new("obv", 0);
        let evaluator = IndicatorEvaluator::default();

        let bars: Vec<Bar> = (0..5).map(|i| bar(i, 100.0 + i as f64)).collect();
        let first = evaluator.evaluate("AAPL", interval, &bars, &config).unwrap().unwrap();

        // Window evicted bar 0; only the newest two bars remain visible.
        let next_bar = bar(5, 106.0);
        let truncated_window = vec![bars[4].clone(), next_bar];
        let second = evaluator.evaluate("AAPL", interval, &truncated_window, &config).unwrap().unwrap();

        let (IndicatorValue::Scalar(first_obv), IndicatorValue::Scalar(second_obv)) = (first, second) else {
            panic!("obv should produce a scalar value");
        };
        assert_eq!(second_obv, first_obv + 106.0, "obv should add just the newest bar's volume, continuing from its prior total");
    }

    #[test]
    fn vwap_carries_its_cumulative_accumulators_forward() {
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        let config = IndicatorConfig::new("vwap", 0);
        let evaluator = IndicatorEvaluator::default();

        let bars: Vec<Bar> = (0..3).map(|i| bar(i, 100.0 + i as f64)).collect();
        let first = evaluator.evaluate("AAPL", interval, &bars, &config).unwrap().unwrap();
        let IndicatorValue::Vwap { cumulative_volume: first_volume, .. } = first else {
            panic!("vwap should produce a Vwap value");
        };

        let truncated_window = vec![bars[2].clone()];
        let second = evaluator.evaluate("AAPL", interval, &truncated_window, &config).unwrap().unwrap();
        let IndicatorValue::Vwap { cumulative_volume: second_volume, .. } = second else {
            panic!("vwap should produce a Vwap value");
        };

        assert_eq!(second_volume, first_volume + bars[2].volume, "cumulative volume should keep accruing, not reset from the truncated window");
    }
}
