use std::collections::HashMap;

use analysis_core::{AnalysisError, Bar, IntervalLabel};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use serde_json::json;

use crate::types::{AppendMode, BarIntervalData, SymbolSessionData};

/// How many trading days of historical bars `roll_session` keeps before
/// evicting the oldest. Not currently exposed as a constructor knob —
/// sessions track a handful of symbols each with a handful of intervals,
/// so a generous fixed window costs little and avoids plumbing a new
/// parameter through every `SessionState::new` call site.
const DEFAULT_MAX_HISTORICAL_DAYS: usize = 30;

/// Snapshot of a symbol's current-session activity for one interval,
/// computed from the live window only — historical bars never contribute,
/// so `session_volume` reflects what actually traded today.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionMetrics {
    pub bar_count: usize,
    pub session_volume: f64,
    pub session_high: Option<f64>,
    pub session_low: Option<f64>,
    pub latest_close: Option<f64>,
}

/// The live, per-symbol working set shared by the replay queue, quality
/// engine, and indicator framework during a session. Backed by one
/// coarse-grained lock over the symbol map: simpler than per-symbol locks
/// and, at the symbol counts a single session tracks, contention isn't the
/// bottleneck — the provider I/O and disk reads are.
pub struct SessionState {
    symbols: RwLock<HashMap<String, SymbolSessionData>>,
    max_bars_per_interval: usize,
    max_historical_days: usize,
    last_export: RwLock<Option<DateTime<Utc>>>,
}

impl SessionState {
    pub fn new(max_bars_per_interval: usize) -> Self {
        Self {
            symbols: RwLock::new(HashMap::new()),
            max_bars_per_interval,
            max_historical_days: DEFAULT_MAX_HISTORICAL_DAYS,
            last_export: RwLock::new(None),
        }
    }

    fn max_len_for(&self, mode: AppendMode) -> Option<usize> {
        match mode {
            AppendMode::Historical => None,
            AppendMode::Auto | AppendMode::Stream | AppendMode::GapFill => Some(self.max_bars_per_interval),
        }
    }

    /// Registers a symbol if it isn't already tracked; idempotent. Symbols
    /// added this way are treated as part of the session's configured list.
    pub fn register_symbol(&self, symbol: &str) {
        self.symbols.write().entry(symbol.to_string()).or_insert_with(|| SymbolSessionData::new(symbol));
    }

    /// As `register_symbol`, but lets a caller seed the full record (used
    /// when restoring a working set, e.g. from a checkpoint).
    pub fn register_symbol_data(&self, data: SymbolSessionData) {
        self.symbols.write().entry(data.symbol.clone()).or_insert(data);
    }

    /// Adds a symbol outside the session's configured list (scanner-found
    /// candidate, ad hoc watch). Marked as not meeting the session's
    /// configuration requirements so callers can distinguish it from a
    /// configured symbol when deciding what to, e.g., persist on restart.
    pub fn add_symbol(&self, symbol: &str) {
        let mut guard = self.symbols.write();
        let data = guard.entry(symbol.to_string()).or_insert_with(|| SymbolSessionData::new(symbol));
        data.meets_session_config_requirements = false;
    }

    /// Adds or replaces one bar. `Auto` routes the bar to the current
    /// session's live container if its date matches the symbol's current
    /// session date, otherwise to the historical store — mirroring a
    /// reader asking "is this today's bar, or an old one?" This crate has
    /// no exchange-timezone of its own, so the comparison uses the bar's
    /// UTC calendar date as a stand-in for its trading date; callers that
    /// need exact exchange-local dating (the coordinator does) pass
    /// `Stream`/`Historical` explicitly instead of relying on `Auto`.
    pub fn append_bar(&self, symbol: &str, bar: Bar, mode: AppendMode) -> Result<(), AnalysisError> {
        bar.validate()?;
        if bar.symbol != symbol {
            return Err(AnalysisError::InvalidData(format!(
                "append_bar: bar symbol {} does not match target {symbol}",
                bar.symbol
            )));
        }
        let interval = bar.interval;
        let mut guard = self.symbols.write();
        let data = guard.entry(symbol.to_string()).or_insert_with(|| SymbolSessionData::new(symbol));

        let effective_mode = match mode {
            AppendMode::Auto => match data.current_session_date {
                Some(session_date) if bar.timestamp.date_naive() == session_date => AppendMode::Stream,
                Some(_) => AppendMode::Historical,
                None => {
                    let tail = data.intervals.get(&interval).and_then(|d| d.bars.last());
                    match tail {
                        Some(last) if bar.timestamp > last.timestamp => AppendMode::Stream,
                        Some(_) => AppendMode::GapFill,
                        None => AppendMode::Historical,
                    }
                }
            },
            other => other,
        };

        match effective_mode {
            AppendMode::Historical => {
                let date = bar.timestamp.date_naive();
                data.insert_historical(date, bar);
            }
            _ => {
                let max_len = self.max_len_for(effective_mode);
                data.interval_mut(interval).upsert(bar, max_len);
            }
        }
        Ok(())
    }

    pub fn add_bar(&self, symbol: &str, bar: Bar) -> Result<(), AnalysisError> {
        self.append_bar(symbol, bar, AppendMode::Auto)
    }

    pub fn add_bars_batch(&self, symbol: &str, bars: Vec<Bar>, mode: AppendMode) -> Result<usize, AnalysisError> {
        let mut count = 0;
        for bar in bars {
            self.append_bar(symbol, bar, mode)?;
            count += 1;
        }
        Ok(count)
    }

    /// Loads `trailing_days` worth of bars for each interval through
    /// `loader`, grouping the result by date in the symbol's historical
    /// store. `loader` is given the date and interval and returns that
    /// day's bars (or an empty vec if none are stored).
    pub fn load_historical_bars(
        &self,
        symbol: &str,
        dates: &[NaiveDate],
        intervals: &[IntervalLabel],
        mut loader: impl FnMut(NaiveDate, IntervalLabel) -> Result<Vec<Bar>, AnalysisError>,
    ) -> Result<usize, AnalysisError> {
        let mut total = 0;
        for &date in dates {
            for &interval in intervals {
                let bars = loader(date, interval)?;
                total += bars.len();
                self.add_bars_batch(symbol, bars, AppendMode::Historical)?;
            }
        }
        Ok(total)
    }

    pub fn get_historical_bars(&self, symbol: &str, days_back: usize, interval: IntervalLabel) -> Vec<Bar> {
        self.symbols.read().get(symbol).map(|d| d.historical_bars(interval, days_back)).unwrap_or_default()
    }

    pub fn get_all_bars_including_historical(&self, symbol: &str, interval: IntervalLabel) -> Vec<Bar> {
        self.symbols.read().get(symbol).map(|d| d.all_bars_including_historical(interval)).unwrap_or_default()
    }

    /// Marks the session active for `symbol` and sets `current_session_date`
    /// so subsequent `Auto` appends route to the live container.
    pub fn activate_session(&self, symbol: &str, date: NaiveDate) {
        let mut guard = self.symbols.write();
        let data = guard.entry(symbol.to_string()).or_insert_with(|| SymbolSessionData::new(symbol));
        data.session_active = true;
        data.current_session_date = Some(date);
    }

    pub fn deactivate_session(&self, symbol: &str) {
        if let Some(data) = self.symbols.write().get_mut(symbol) {
            data.session_active = false;
        }
    }

    pub fn is_session_active(&self, symbol: &str) -> bool {
        self.symbols.read().get(symbol).map(|d| d.session_active).unwrap_or(false)
    }

    /// Moves the current session's live bars into the historical store
    /// under the outgoing date, evicts historical dates older than the
    /// retention window, clears the live container, and resets per-symbol
    /// metrics — the bridge between one trading day and the next.
    pub fn roll_session(&self, symbol: &str, new_date: NaiveDate) -> Result<(), AnalysisError> {
        let mut guard = self.symbols.write();
        let data = guard.entry(symbol.to_string()).or_insert_with(|| SymbolSessionData::new(symbol));

        if let Some(outgoing) = data.current_session_date {
            for (_, interval_data) in data.intervals.drain() {
                for bar in interval_data.bars {
                    data.insert_historical(outgoing, bar);
                }
            }
        }

        while data.historical.len() > self.max_historical_days {
            let oldest = *data.historical.keys().next().expect("checked non-empty by len() > max above");
            data.historical.remove(&oldest);
        }

        data.current_session_date = Some(new_date);
        data.quality.clear();
        data.gaps.clear();
        Ok(())
    }

    pub fn lock_symbol(&self, symbol: &str, reason: &str) {
        let mut guard = self.symbols.write();
        let data = guard.entry(symbol.to_string()).or_insert_with(|| SymbolSessionData::new(symbol));
        data.locked = true;
        data.lock_reason = Some(reason.to_string());
    }

    pub fn unlock_symbol(&self, symbol: &str) {
        if let Some(data) = self.symbols.write().get_mut(symbol) {
            data.locked = false;
            data.lock_reason = None;
        }
    }

    pub fn is_locked(&self, symbol: &str) -> bool {
        self.symbols.read().get(symbol).map(|d| d.locked).unwrap_or(false)
    }

    pub fn is_symbol_locked(&self, symbol: &str) -> bool {
        self.is_locked(symbol)
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut names: Vec<String> = self.symbols.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn remove_symbol(&self, symbol: &str) -> Result<(), AnalysisError> {
        let mut guard = self.symbols.write();
        if guard.get(symbol).map(|d| d.locked).unwrap_or(false) {
            return Err(AnalysisError::InvariantViolation(format!("{symbol} is locked and cannot be removed")));
        }
        guard.remove(symbol);
        Ok(())
    }

    /// As `remove_symbol`, but additionally refuses a symbol that's part
    /// of the session's configured list — only ad hoc, scanner-added
    /// symbols can be dropped this way.
    pub fn remove_symbol_adhoc(&self, symbol: &str) -> Result<(), AnalysisError> {
        let mut guard = self.symbols.write();
        match guard.get(symbol) {
            Some(data) if data.locked => {
                return Err(AnalysisError::InvariantViolation(format!("{symbol} is locked and cannot be removed")));
            }
            Some(data) if data.meets_session_config_requirements => {
                return Err(AnalysisError::InvariantViolation(format!(
                    "{symbol} is part of the session's configured symbol list and cannot be removed ad hoc"
                )));
            }
            Some(_) => {}
            None => return Ok(()),
        }
        guard.remove(symbol);
        Ok(())
    }

    pub fn add_historical_bars(&self, symbol: &str, date: NaiveDate, bars: Vec<Bar>) -> Result<usize, AnalysisError> {
        let mut guard = self.symbols.write();
        let data = guard.entry(symbol.to_string()).or_insert_with(|| SymbolSessionData::new(symbol));
        let count = bars.len();
        for bar in bars {
            bar.validate()?;
            data.insert_historical(date, bar);
        }
        Ok(count)
    }

    pub fn add_session_bars(&self, symbol: &str, bars: Vec<Bar>) -> Result<usize, AnalysisError> {
        self.add_bars_batch(symbol, bars, AppendMode::Stream)
    }

    pub fn add_indicator(&self, symbol: &str, indicator_name: &str) {
        let mut guard = self.symbols.write();
        let data = guard.entry(symbol.to_string()).or_insert_with(|| SymbolSessionData::new(symbol));
        if !data.indicators.iter().any(|n| n == indicator_name) {
            data.indicators.push(indicator_name.to_string());
        }
    }

    pub fn set_quality(&self, symbol: &str, interval: IntervalLabel, completeness: f64) {
        let mut guard = self.symbols.write();
        let data = guard.entry(symbol.to_string()).or_insert_with(|| SymbolSessionData::new(symbol));
        data.quality.insert(interval, completeness);
    }

    pub fn get_quality_metric(&self, symbol: &str, interval: IntervalLabel) -> Option<f64> {
        self.symbols.read().get(symbol).and_then(|d| d.quality.get(&interval).copied())
    }

    pub fn set_gaps(&self, symbol: &str, interval: IntervalLabel, gaps: Vec<DateTime<Utc>>) {
        let mut guard = self.symbols.write();
        let data = guard.entry(symbol.to_string()).or_insert_with(|| SymbolSessionData::new(symbol));
        data.gaps.insert(interval, gaps);
    }

    pub fn get_gaps(&self, symbol: &str, interval: IntervalLabel) -> Vec<DateTime<Utc>> {
        self.symbols.read().get(symbol).and_then(|d| d.gaps.get(&interval).cloned()).unwrap_or_default()
    }

    /// `true` unless `internal` is false and the symbol's session is
    /// inactive — external readers (CLI queries, dashboards) shouldn't see
    /// a partially-seeded or already-ended session; pipeline workers pass
    /// `internal = true` to bypass the gate.
    fn readable(&self, data: &SymbolSessionData, internal: bool) -> bool {
        internal || data.session_active
    }

    pub fn latest_bar(&self, symbol: &str, interval: IntervalLabel, internal: bool) -> Option<Bar> {
        let guard = self.symbols.read();
        let data = guard.get(symbol)?;
        if !self.readable(data, internal) {
            return None;
        }
        data.intervals.get(&interval)?.latest().cloned()
    }

    pub fn last_n_bars(&self, symbol: &str, interval: IntervalLabel, n: usize, internal: bool) -> Vec<Bar> {
        let guard = self.symbols.read();
        let Some(data) = guard.get(symbol) else { return Vec::new() };
        if !self.readable(data, internal) {
            return Vec::new();
        }
        data.intervals.get(&interval).map(|d| d.last_n(n).to_vec()).unwrap_or_default()
    }

    pub fn bars_since(&self, symbol: &str, interval: IntervalLabel, ts: DateTime<Utc>, internal: bool) -> Vec<Bar> {
        let guard = self.symbols.read();
        let Some(data) = guard.get(symbol) else { return Vec::new() };
        if !self.readable(data, internal) {
            return Vec::new();
        }
        data.intervals.get(&interval).map(|d| d.bars_since_ts(ts).to_vec()).unwrap_or_default()
    }

    pub fn bar_count(&self, symbol: &str, interval: IntervalLabel, internal: bool) -> usize {
        let guard = self.symbols.read();
        let Some(data) = guard.get(symbol) else { return 0 };
        if !self.readable(data, internal) {
            return 0;
        }
        data.intervals.get(&interval).map(|d| d.bars.len()).unwrap_or(0)
    }

    /// Latest bar per interval for a batch of symbols in one lock
    /// acquisition — cheaper than calling `latest_bar` in a loop when
    /// scanning many symbols at once.
    pub fn latest_bars_multi(&self, symbols: &[String], interval: IntervalLabel, internal: bool) -> HashMap<String, Bar> {
        let guard = self.symbols.read();
        symbols
            .iter()
            .filter_map(|symbol| {
                let data = guard.get(symbol)?;
                if !self.readable(data, internal) {
                    return None;
                }
                let bar = data.intervals.get(&interval)?.latest()?.clone();
                Some((symbol.clone(), bar))
            })
            .collect()
    }

    pub fn session_metrics(&self, symbol: &str, interval: IntervalLabel, internal: bool) -> Option<SessionMetrics> {
        let guard = self.symbols.read();
        let data = guard.get(symbol)?;
        if !self.readable(data, internal) {
            return None;
        }
        let bars = &data.intervals.get(&interval)?.bars;
        let session_volume: f64 = bars.iter().map(|b| b.volume).sum();
        let session_high = bars.iter().map(|b| b.high).fold(None, |acc: Option<f64>, h| Some(acc.map_or(h, |a| a.max(h))));
        let session_low = bars.iter().map(|b| b.low).fold(None, |acc: Option<f64>, l| Some(acc.map_or(l, |a| a.min(l))));
        Some(SessionMetrics {
            bar_count: bars.len(),
            session_volume,
            session_high,
            session_low,
            latest_close: bars.last().map(|b| b.close),
        })
    }

    /// Zero-copy escape hatch: callers that need to avoid allocating a
    /// clone of a potentially large bar window (e.g. streaming a window to
    /// a writer) can hold this guard. Prefer `with_bars_ref` unless that
    /// allocation genuinely matters — holding this guard blocks writers to
    /// every symbol, not just this one.
    pub fn get_bars_ref(&self, symbol: &str, interval: IntervalLabel, internal: bool) -> Option<MappedRwLockReadGuard<'_, [Bar]>> {
        let guard = self.symbols.read();
        let data = guard.get(symbol)?;
        if !self.readable(data, internal) {
            return None;
        }
        data.intervals.get(&interval)?;
        Some(RwLockReadGuard::map(guard, |m| {
            m.get(symbol).and_then(|d| d.intervals.get(&interval)).map(|d| d.bars.as_slice()).unwrap_or(&[])
        }))
    }

    /// Safer alternative to `get_bars_ref`: the lock is held only for the
    /// duration of `f`.
    pub fn with_bars_ref<R>(&self, symbol: &str, interval: IntervalLabel, internal: bool, f: impl FnOnce(&[Bar]) -> R) -> Option<R> {
        let guard = self.symbols.read();
        let data = guard.get(symbol)?;
        if !self.readable(data, internal) {
            return None;
        }
        let bars = data.intervals.get(&interval)?.bars.as_slice();
        Some(f(bars))
    }

    /// Copying read with an instant range filter, bypassing the
    /// session-active gate only when `internal` is set.
    pub fn get_bars(&self, symbol: &str, interval: IntervalLabel, start: DateTime<Utc>, end: DateTime<Utc>, internal: bool) -> Vec<Bar> {
        self.with_bars_ref(symbol, interval, internal, |bars| {
            bars.iter().filter(|b| b.timestamp >= start && b.timestamp <= end).cloned().collect()
        })
        .unwrap_or_default()
    }

    /// Current bar count for (symbol, interval) — usable as the cursor
    /// passed back into a later `to_json_delta` call.
    pub fn delta_cursor(&self, symbol: &str, interval: IntervalLabel) -> usize {
        self.symbols.read().get(symbol).and_then(|d| d.intervals.get(&interval)).map(|d| d.bars.len()).unwrap_or(0)
    }

    pub fn to_json_full(&self) -> serde_json::Value {
        let guard = self.symbols.read();
        let symbols: serde_json::Map<String, serde_json::Value> = guard
            .iter()
            .map(|(symbol, data)| {
                let intervals: serde_json::Map<String, serde_json::Value> = data
                    .intervals
                    .iter()
                    .map(|(interval, interval_data)| (interval.to_string(), json!(interval_data.bars)))
                    .collect();
                (
                    symbol.clone(),
                    json!({
                        "session_active": data.session_active,
                        "locked": data.locked,
                        "intervals": intervals,
                    }),
                )
            })
            .collect();
        serde_json::Value::Object(symbols)
    }

    /// `cursors` maps `"{symbol}:{interval}"` to a previously returned
    /// `delta_cursor` value; the response carries only bars appended since.
    pub fn to_json_delta(&self, cursors: &HashMap<String, usize>) -> serde_json::Value {
        let guard = self.symbols.read();
        let symbols: serde_json::Map<String, serde_json::Value> = guard
            .iter()
            .map(|(symbol, data)| {
                let intervals: serde_json::Map<String, serde_json::Value> = data
                    .intervals
                    .iter()
                    .map(|(interval, interval_data)| {
                        let key = format!("{symbol}:{interval}");
                        let cursor = cursors.get(&key).copied().unwrap_or(0);
                        (interval.to_string(), json!(interval_data.bars_since(cursor)))
                    })
                    .collect();
                (symbol.clone(), json!({ "intervals": intervals }))
            })
            .collect();
        serde_json::Value::Object(symbols)
    }

    /// Full or delta export of the whole working set. `complete = true`
    /// dumps every live bar per symbol/interval; `complete = false` dumps
    /// only bars appended since each interval's `last_exported_index`,
    /// advancing that cursor as a side effect. Returns the document and
    /// the timestamp of the previous export call, so callers can report
    /// how stale the last snapshot was.
    pub fn to_json(&self, complete: bool) -> (serde_json::Value, Option<DateTime<Utc>>) {
        let prev = *self.last_export.read();
        *self.last_export.write() = Some(Utc::now());

        if complete {
            return (self.to_json_full(), prev);
        }

        let mut guard = self.symbols.write();
        let symbols: serde_json::Map<String, serde_json::Value> = guard
            .iter_mut()
            .map(|(symbol, data)| {
                let intervals: serde_json::Map<String, serde_json::Value> = data
                    .intervals
                    .iter_mut()
                    .map(|(interval, interval_data): (&IntervalLabel, &mut BarIntervalData)| {
                        let fresh = interval_data.bars_since(interval_data.last_exported_index).to_vec();
                        interval_data.last_exported_index = interval_data.bars.len();
                        (interval.to_string(), json!(fresh))
                    })
                    .collect();
                (symbol.clone(), json!({ "intervals": intervals }))
            })
            .collect();
        (serde_json::Value::Object(symbols), prev)
    }
}
