use std::collections::HashMap;

use analysis_core::IntervalLabel;
use time_service::TimeMode;

use crate::config::SessionConfig;

/// The STREAMED/GENERATED split for one symbol (spec §4.6 Phase 1): bars
/// for `streamed_base` come straight from the store/provider; everything
/// in `generated` is derived from it by window aggregation.
#[derive(Debug, Clone)]
pub struct SymbolStreamPlan {
    pub streamed_base: Option<IntervalLabel>,
    pub generated: Vec<IntervalLabel>,
    pub stream_quotes: bool,
    pub stream_ticks: bool,
}

/// Decides each symbol's stream plan from its requested intervals: the
/// smallest requested interval becomes the single STREAMED base (backtest
/// streams exactly one), everything else is derived from it. Ticks are a
/// request for the raw `Tick` feed, distinct from a `1s` bar stream; they
/// are dropped in backtest mode per spec (live mode defers to whatever the
/// provider can push).
pub fn determine(config: &SessionConfig, mode: TimeMode) -> HashMap<String, SymbolStreamPlan> {
    let mut plans = HashMap::new();
    for symbol in &config.symbols {
        let Some(request) = config.streams.get(symbol) else {
            plans.insert(symbol.clone(), SymbolStreamPlan { streamed_base: None, generated: Vec::new(), stream_quotes: false, stream_ticks: false });
            continue;
        };

        let mut intervals = request.intervals.clone();
        intervals.sort_by_key(|i| i.as_seconds());
        let streamed_base = intervals.first().copied();
        let generated = intervals.into_iter().skip(1).collect();

        let stream_ticks = match mode {
            TimeMode::Backtest => false,
            TimeMode::Live => request.ticks,
        };

        plans.insert(
            symbol.clone(),
            SymbolStreamPlan { streamed_base, generated, stream_quotes: request.quotes, stream_ticks },
        );
    }
    plans
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use analysis_core::IntervalUnit;
    use chrono::NaiveDate;

    use super::*;
    use crate::config::SymbolStreamRequest;

    fn base_config(streams: HashMap<String, SymbolStreamRequest>) -> SessionConfig {
        SessionConfig {
            exchange_group: "us_equity".to_string(),
            asset_class: "equity".to_string(),
            symbols: streams.keys().cloned().collect(),
            streams,
            historical: Vec::new(),
            historical_indicators: Vec::new(),
            enable_historical_quality: true,
            speed_multiplier: 1.0,
            backtest_start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            backtest_end_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            max_bars_per_interval: 1000,
        }
    }

    #[test]
    fn smallest_configured_interval_becomes_the_streamed_base() {
        let mut streams = HashMap::new();
        streams.insert(
            "AAPL".to_string(),
            SymbolStreamRequest { intervals: vec![IntervalLabel::new(5, IntervalUnit::Minute), IntervalLabel::new(1, IntervalUnit::Minute)], quotes: true, ticks: true },
        );
        let plans = determine(&base_config(streams), TimeMode::Backtest);
        let plan = &plans["AAPL"];
        assert_eq!(plan.streamed_base, Some(IntervalLabel::new(1, IntervalUnit::Minute)));
        assert_eq!(plan.generated, vec![IntervalLabel::new(5, IntervalUnit::Minute)]);
        assert!(plan.stream_quotes);
        assert!(!plan.stream_ticks, "ticks are ignored in backtest");
    }

    #[test]
    fn live_mode_honors_a_tick_request() {
        let mut streams = HashMap::new();
        streams.insert(
            "AAPL".to_string(),
            SymbolStreamRequest { intervals: vec![IntervalLabel::new(1, IntervalUnit::Minute)], quotes: false, ticks: true },
        );
        let plans = determine(&base_config(streams), TimeMode::Live);
        assert!(plans["AAPL"].stream_ticks);
    }
}
