use std::collections::{BTreeMap, HashMap};

use analysis_core::{Bar, IntervalLabel};
use chrono::{DateTime, NaiveDate, Utc};

/// How a bar arrived, per spec: a stream tick appends to the live edge, a
/// gap-fill backfills a hole discovered mid-session, a historical load
/// seeds the trailing window at startup, and `Auto` lets the working set
/// infer which of the three applies from the bar's date relative to the
/// symbol's current session date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendMode {
    Auto,
    Stream,
    GapFill,
    Historical,
}

/// The trailing bar window for one (symbol, interval). `version` increments
/// on every mutation so `SessionState::to_json` can serve cheap deltas;
/// `last_exported_index` is the cursor `to_json`'s delta mode advances past
/// on each call.
#[derive(Debug, Clone, Default)]
pub struct BarIntervalData {
    pub bars: Vec<Bar>,
    pub version: u64,
    pub last_exported_index: usize,
}

impl BarIntervalData {
    /// Inserts or replaces a bar, keeping `bars` sorted ascending by
    /// timestamp and capped at `max_len` (oldest dropped first — the
    /// trailing-day retention policy lives in the coordinator, this just
    /// enforces the cap it's told).
    pub fn upsert(&mut self, bar: Bar, max_len: Option<usize>) {
        match self.bars.binary_search_by_key(&bar.timestamp, |b| b.timestamp) {
            Ok(idx) => self.bars[idx] = bar,
            Err(idx) => self.bars.insert(idx, bar),
        }
        self.version += 1;
        if let Some(max_len) = max_len {
            while self.bars.len() > max_len {
                self.bars.remove(0);
                self.last_exported_index = self.last_exported_index.saturating_sub(1);
            }
        }
    }

    /// Bars appended since a prior snapshot of length `cursor_len`.
    pub fn bars_since(&self, cursor_len: usize) -> &[Bar] {
        if cursor_len >= self.bars.len() {
            return &[];
        }
        &self.bars[cursor_len..]
    }

    /// Bars strictly after `ts`.
    pub fn bars_since_ts(&self, ts: DateTime<Utc>) -> &[Bar] {
        let idx = self.bars.partition_point(|b| b.timestamp <= ts);
        &self.bars[idx..]
    }

    pub fn last_n(&self, n: usize) -> &[Bar] {
        let start = self.bars.len().saturating_sub(n);
        &self.bars[start..]
    }

    pub fn latest(&self) -> Option<&Bar> {
        self.bars.last()
    }
}

/// The full per-symbol working set: one `BarIntervalData` per interval the
/// current session is tracking, a separate date-bucketed store for
/// historical bars (spec §4.4's `historical` store, kept apart from the
/// current session's container so session-scoped reads such as volume
/// never pick up a prior day's bars), plus the symbol-level flags and
/// quality/gap bookkeeping spec §4.4/§4.7 call for.
#[derive(Debug, Default)]
pub struct SymbolSessionData {
    pub symbol: String,
    pub intervals: HashMap<IntervalLabel, BarIntervalData>,
    pub historical: BTreeMap<NaiveDate, HashMap<IntervalLabel, Vec<Bar>>>,
    /// The trading date `intervals` currently holds bars for. `Auto`
    /// appends compare a bar's date against this to decide whether it
    /// belongs in the live container or in `historical`.
    pub current_session_date: Option<NaiveDate>,
    /// `true` once the session has finished historical seeding and is
    /// accepting live/derived bars; external readers should not see a
    /// partially-seeded working set.
    pub session_active: bool,
    /// Pinned by an operator via `lock_symbol`; pinned symbols are exempt
    /// from idle eviction and removal.
    pub locked: bool,
    pub lock_reason: Option<String>,
    /// `false` for symbols added ad hoc through the scanner-framework APIs
    /// rather than through the session's configured symbol list.
    pub meets_session_config_requirements: bool,
    pub quality: HashMap<IntervalLabel, f64>,
    pub gaps: HashMap<IntervalLabel, Vec<DateTime<Utc>>>,
    /// Indicator names registered against this symbol through the
    /// scanner-framework `add_indicator` API; evaluation itself happens in
    /// `indicator-framework`, this is bookkeeping only.
    pub indicators: Vec<String>,
}

impl SymbolSessionData {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            intervals: HashMap::new(),
            historical: BTreeMap::new(),
            current_session_date: None,
            session_active: false,
            locked: false,
            lock_reason: None,
            meets_session_config_requirements: true,
            quality: HashMap::new(),
            gaps: HashMap::new(),
            indicators: Vec::new(),
        }
    }

    pub fn interval_mut(&mut self, interval: IntervalLabel) -> &mut BarIntervalData {
        self.intervals.entry(interval).or_default()
    }

    /// Inserts a historical bar under its own calendar date, sorted and
    /// deduplicated by timestamp the same way `BarIntervalData::upsert`
    /// dedups the live window.
    pub fn insert_historical(&mut self, date: NaiveDate, bar: Bar) {
        let bucket = self.historical.entry(date).or_default().entry(bar.interval).or_default();
        match bucket.binary_search_by_key(&bar.timestamp, |b| b.timestamp) {
            Ok(idx) => bucket[idx] = bar,
            Err(idx) => bucket.insert(idx, bar),
        }
    }

    /// Historical bars for one interval across the last `days_back` dates
    /// present in `historical`, oldest first.
    pub fn historical_bars(&self, interval: IntervalLabel, days_back: usize) -> Vec<Bar> {
        self.historical
            .iter()
            .rev()
            .take(days_back)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .flat_map(|(_, by_interval)| by_interval.get(&interval).cloned().unwrap_or_default())
            .collect()
    }

    /// Every historical bar for one interval, oldest date first, followed
    /// by the current session's bars for that interval.
    pub fn all_bars_including_historical(&self, interval: IntervalLabel) -> Vec<Bar> {
        let mut out: Vec<Bar> = self.historical.values().flat_map(|by_interval| by_interval.get(&interval).cloned().unwrap_or_default()).collect();
        if let Some(current) = self.intervals.get(&interval) {
            out.extend(current.bars.iter().cloned());
        }
        out
    }
}
