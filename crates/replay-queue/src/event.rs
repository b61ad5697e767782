use analysis_core::{Bar, Quote, Tick};
use chrono::{DateTime, Utc};

/// One replayable market-data event. The ordering used by the merge —
/// timestamp, then symbol ascending, then `EventKind::rank` — is what
/// makes replay deterministic across runs of the same historical window.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayEvent {
    Bar(Bar),
    Tick(Tick),
    Quote(Quote),
}

impl ReplayEvent {
    pub fn symbol(&self) -> &str {
        match self {
            ReplayEvent::Bar(b) => &b.symbol,
            ReplayEvent::Tick(t) => &t.symbol,
            ReplayEvent::Quote(q) => &q.symbol,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ReplayEvent::Bar(b) => b.timestamp,
            ReplayEvent::Tick(t) => t.timestamp,
            ReplayEvent::Quote(q) => q.timestamp,
        }
    }

    /// Tie-break rank when two events share a timestamp: bar, then tick,
    /// then quote.
    fn rank(&self) -> u8 {
        match self {
            ReplayEvent::Bar(_) => 0,
            ReplayEvent::Tick(_) => 1,
            ReplayEvent::Quote(_) => 2,
        }
    }

    /// Sort key implementing the coordinator's deterministic merge order:
    /// timestamp ascending, symbol ascending, then event-kind rank.
    pub fn sort_key(&self) -> (DateTime<Utc>, &str, u8) {
        (self.timestamp(), self.symbol(), self.rank())
    }

    /// Owned variant of `sort_key`, needed wherever the borrow can't be
    /// tied to the event's lifetime (e.g. comparing across queues while
    /// only holding references into a locked map).
    pub fn sort_key_owned(&self) -> (DateTime<Utc>, String, u8) {
        (self.timestamp(), self.symbol().to_string(), self.rank())
    }
}
