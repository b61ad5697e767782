pub mod invariants;
pub mod state;
pub mod types;

pub use state::{SessionMetrics, SessionState};
pub use types::{AppendMode, BarIntervalData, SymbolSessionData};

#[cfg(test)]
mod tests {
    use analysis_core::IntervalUnit;
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;
    use analysis_core::{Bar, IntervalLabel};

    fn bar(symbol: &str, secs: i64, close: f64) -> Bar {
        Bar {
            symbol: symbol.into(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            interval: IntervalLabel::new(1, IntervalUnit::Minute),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn append_and_read_back() {
        let state = SessionState::new(1000);
        state.append_bar("AAPL", bar("AAPL", 1_700_000_000, 100.0), AppendMode::Stream).unwrap();
        state.append_bar("AAPL", bar("AAPL", 1_700_000_060, 101.0), AppendMode::Stream).unwrap();

        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        let bars = state.with_bars_ref("AAPL", interval, true, |b| b.to_vec()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, 101.0);
    }

    #[test]
    fn trailing_window_caps_at_max_len() {
        let state = SessionState::new(2);
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        for i in 0..5 {
            state
                .append_bar("AAPL", bar("AAPL", 1_700_000_000 + i * 60, 100.0 + i as f64), AppendMode::Stream)
                .unwrap();
        }
        let bars = state.with_bars_ref("AAPL", interval, true, |b| b.to_vec()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, 104.0);
    }

    #[test]
    fn locked_symbol_cannot_be_removed() {
        let state = SessionState::new(100);
        state.append_bar("AAPL", bar("AAPL", 1_700_000_000, 100.0), AppendMode::Historical).unwrap();
        state.lock_symbol("AAPL", "manual watch");
        assert!(state.remove_symbol("AAPL").is_err());
        state.unlock_symbol("AAPL");
        assert!(state.remove_symbol("AAPL").is_ok());
    }

    #[test]
    fn delta_cursor_only_returns_new_bars() {
        let state = SessionState::new(100);
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        state.append_bar("AAPL", bar("AAPL", 1_700_000_000, 100.0), AppendMode::Stream).unwrap();
        let cursor = state.delta_cursor("AAPL", interval);
        state.append_bar("AAPL", bar("AAPL", 1_700_000_060, 101.0), AppendMode::Stream).unwrap();

        let mut cursors = std::collections::HashMap::new();
        cursors.insert(format!("AAPL:{interval}"), cursor);
        let delta = state.to_json_delta(&cursors);
        let bars = delta["AAPL"]["intervals"][interval.to_string()].as_array().unwrap();
        assert_eq!(bars.len(), 1);
    }

    #[test]
    fn invariant_check_flags_unordered_bars() {
        let mut data = SymbolSessionData::new("AAPL");
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        data.interval_mut(interval).bars.push(bar("AAPL", 1_700_000_060, 101.0));
        data.interval_mut(interval).bars.push(bar("AAPL", 1_700_000_000, 100.0));
        let violations = invariants::check(&data);
        assert!(!violations.is_empty());
    }

    #[test]
    fn historical_bars_are_excluded_from_session_metrics() {
        let state = SessionState::new(1000);
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        let today = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();

        // Yesterday's bars load as historical.
        state.append_bar("AAPL", bar("AAPL", 1_699_900_000, 90.0), AppendMode::Historical).unwrap();
        state.append_bar("AAPL", bar("AAPL", 1_699_900_060, 91.0), AppendMode::Historical).unwrap();

        state.activate_session("AAPL", today);
        state.append_bar("AAPL", bar("AAPL", 1_704_270_000, 100.0), AppendMode::Stream).unwrap();
        state.append_bar("AAPL", bar("AAPL", 1_704_270_060, 101.0), AppendMode::Stream).unwrap();

        let metrics = state.session_metrics("AAPL", interval, true).unwrap();
        assert_eq!(metrics.bar_count, 2, "session metrics must not count yesterday's historical bars");
        assert_eq!(metrics.session_volume, 20.0);

        let all = state.get_all_bars_including_historical("AAPL", interval);
        assert_eq!(all.len(), 4, "combined historical+session read should see every bar");
    }

    #[test]
    fn auto_mode_routes_same_day_bars_live_and_other_days_to_historical() {
        let state = SessionState::new(1000);
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        let today = Utc.timestamp_opt(1_704_270_000, 0).unwrap().date_naive();
        state.activate_session("AAPL", today);

        state.append_bar("AAPL", bar("AAPL", 1_704_270_000, 100.0), AppendMode::Auto).unwrap();
        state.append_bar("AAPL", bar("AAPL", 1_699_900_000, 90.0), AppendMode::Auto).unwrap();

        assert_eq!(state.bar_count("AAPL", interval, true), 1);
        assert_eq!(state.get_historical_bars("AAPL", 30, interval).len(), 1);
    }

    #[test]
    fn external_reads_are_gated_while_session_is_inactive() {
        let state = SessionState::new(1000);
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        state.append_bar("AAPL", bar("AAPL", 1_700_000_000, 100.0), AppendMode::Stream).unwrap();

        assert!(state.latest_bar("AAPL", interval, false).is_none());
        assert!(state.latest_bar("AAPL", interval, true).is_some());

        state.activate_session("AAPL", Utc.timestamp_opt(1_700_000_000, 0).unwrap().date_naive());
        assert!(state.latest_bar("AAPL", interval, false).is_some());
    }

    #[test]
    fn remove_symbol_adhoc_refuses_configured_symbols() {
        let state = SessionState::new(100);
        state.register_symbol("AAPL");
        state.add_symbol("SPY");

        assert!(state.remove_symbol_adhoc("AAPL").is_err());
        assert!(state.remove_symbol_adhoc("SPY").is_ok());
    }

    #[test]
    fn roll_session_moves_live_bars_into_historical_and_resets_the_window() {
        let state = SessionState::new(1000);
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        let day_one = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let day_two = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();

        state.activate_session("AAPL", day_one);
        state.append_bar("AAPL", bar("AAPL", 1_704_183_600, 100.0), AppendMode::Stream).unwrap();
        state.set_quality("AAPL", interval, 0.99);

        state.roll_session("AAPL", day_two).unwrap();

        assert_eq!(state.bar_count("AAPL", interval, true), 0, "live window should be empty right after a roll");
        assert_eq!(state.get_historical_bars("AAPL", 30, interval).len(), 1);
        assert_eq!(state.get_quality_metric("AAPL", interval), None, "quality resets across a session roll");
    }
}
