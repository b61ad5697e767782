use std::collections::{HashMap, VecDeque};

use analysis_core::{AnalysisError, IntervalLabel};
use parking_lot::{Condvar, Mutex};

use crate::cancellation::CancellationToken;
use crate::event::ReplayEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Bar(IntervalLabel),
    Tick,
    Quote,
}

type QueueKey = (String, StreamKind);

/// Per-(symbol, stream) FIFO queues with a chronological merge across all
/// of them, per the design's replay layer: each queue is fed in order by
/// its own producer, and `next_event` hands back the globally-earliest
/// front element with a deterministic tie-break (same timestamp: symbol
/// ascending, then bar before tick before quote).
pub struct ReplayQueueCoordinator {
    queues: Mutex<HashMap<QueueKey, VecDeque<ReplayEvent>>>,
    condvar: Condvar,
}

impl ReplayQueueCoordinator {
    pub fn new() -> Self {
        Self { queues: Mutex::new(HashMap::new()), condvar: Condvar::new() }
    }

    pub fn register_stream(&self, symbol: &str, kind: StreamKind) {
        self.queues.lock().entry((symbol.to_string(), kind)).or_default();
    }

    /// Appends `events` to the (symbol, kind) queue. Events must not
    /// precede the queue's current tail — each producer is expected to
    /// feed its own stream in chronological order.
    pub fn feed_stream(&self, symbol: &str, kind: StreamKind, events: Vec<ReplayEvent>) -> Result<(), AnalysisError> {
        if events.is_empty() {
            return Ok(());
        }
        for event in &events {
            if event.symbol() != symbol {
                return Err(AnalysisError::InvalidData(format!(
                    "feed_stream: event for {} fed into {symbol}'s queue",
                    event.symbol()
                )));
            }
        }
        let mut guard = self.queues.lock();
        let queue = guard.entry((symbol.to_string(), kind)).or_default();
        if let (Some(last), Some(first)) = (queue.back(), events.first()) {
            if first.timestamp() < last.timestamp() {
                return Err(AnalysisError::InvariantViolation(format!(
                    "feed_stream: {symbol} {kind:?} event at {} precedes queue tail at {}",
                    first.timestamp(),
                    last.timestamp()
                )));
            }
        }
        queue.extend(events);
        self.condvar.notify_all();
        Ok(())
    }

    pub fn queue_stats(&self) -> Vec<(String, StreamKind, usize)> {
        self.queues.lock().iter().map(|((symbol, kind), q)| (symbol.clone(), *kind, q.len())).collect()
    }

    /// Pops the chronologically-next event across every registered queue.
    /// Blocks until an event is available or `cancel` fires, in which
    /// case it returns `None`.
    pub fn next_event(&self, cancel: &CancellationToken) -> Option<ReplayEvent> {
        let mut guard = self.queues.lock();
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            let mut best: Option<((chrono::DateTime<chrono::Utc>, String, u8), QueueKey)> = None;
            for (key, queue) in guard.iter() {
                if let Some(event) = queue.front() {
                    let sort_key = event.sort_key_owned();
                    if best.as_ref().map_or(true, |(b, _)| sort_key < *b) {
                        best = Some((sort_key, key.clone()));
                    }
                }
            }

            if let Some((_, key)) = best {
                return guard.get_mut(&key).and_then(VecDeque::pop_front);
            }

            self.condvar.wait(&mut guard);
        }
    }
}

impl Default for ReplayQueueCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use analysis_core::{IntervalUnit, Tick};
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::event::ReplayEvent;

    fn tick(symbol: &str, secs: i64, price: f64) -> ReplayEvent {
        ReplayEvent::Tick(Tick { symbol: symbol.into(), timestamp: Utc.timestamp_opt(secs, 0).unwrap(), price, size: 1.0 })
    }

    #[test]
    fn merges_two_streams_chronologically() {
        let coordinator = ReplayQueueCoordinator::new();
        coordinator.register_stream("AAPL", StreamKind::Tick);
        coordinator.register_stream("MSFT", StreamKind::Tick);

        coordinator.feed_stream("AAPL", StreamKind::Tick, vec![tick("AAPL", 2, 100.0), tick("AAPL", 4, 101.0)]).unwrap();
        coordinator.feed_stream("MSFT", StreamKind::Tick, vec![tick("MSFT", 1, 200.0), tick("MSFT", 3, 201.0)]).unwrap();

        let cancel = CancellationToken::new();
        let order: Vec<String> = (0..4)
            .map(|_| coordinator.next_event(&cancel).unwrap().symbol().to_string())
            .collect();
        assert_eq!(order, vec!["MSFT", "AAPL", "MSFT", "AAPL"]);
    }

    #[test]
    fn tie_break_orders_by_symbol_then_kind() {
        let coordinator = ReplayQueueCoordinator::new();
        let interval = IntervalLabel::new(1, IntervalUnit::Minute);
        let ts = Utc.timestamp_opt(10, 0).unwrap();
        let bar_event = ReplayEvent::Bar(analysis_core::Bar {
            symbol: "AAPL".into(),
            timestamp: ts,
            interval,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        });
        let tick_event = ReplayEvent::Tick(Tick { symbol: "AAPL".into(), timestamp: ts, price: 1.0, size: 1.0 });

        coordinator.register_stream("AAPL", StreamKind::Bar(interval));
        coordinator.register_stream("AAPL", StreamKind::Tick);
        coordinator.feed_stream("AAPL", StreamKind::Tick, vec![tick_event]).unwrap();
        coordinator.feed_stream("AAPL", StreamKind::Bar(interval), vec![bar_event]).unwrap();

        let cancel = CancellationToken::new();
        let first = coordinator.next_event(&cancel).unwrap();
        assert!(matches!(first, ReplayEvent::Bar(_)));
    }

    #[test]
    fn cancellation_unblocks_waiting_reader() {
        let coordinator = std::sync::Arc::new(ReplayQueueCoordinator::new());
        let cancel = CancellationToken::new();
        let coordinator2 = coordinator.clone();
        let cancel2 = cancel.clone();
        let handle = std::thread::spawn(move || coordinator2.next_event(&cancel2));
        std::thread::sleep(std::time::Duration::from_millis(50));
        cancel.cancel();
        assert!(handle.join().unwrap().is_none());
    }
}
