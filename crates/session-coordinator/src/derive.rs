use analysis_core::{Bar, IntervalLabel};
use chrono::{DateTime, Utc};

/// Window accumulator for one derived interval, fed one base bar at a
/// time. A window is only emitted once a base bar *outside* it has been
/// observed (or `finalize` is called at session close) — spec §4.7's
/// completeness rule: a 5m bar covering 09:30-09:34 doesn't exist until a
/// 09:35 base bar arrives.
pub struct DerivedAggregator {
    symbol: String,
    derived_interval: IntervalLabel,
    window_seconds: i64,
    current: Option<WindowAcc>,
}

struct WindowAcc {
    start: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl DerivedAggregator {
    pub fn new(symbol: impl Into<String>, derived_interval: IntervalLabel) -> Self {
        Self { symbol: symbol.into(), derived_interval, window_seconds: derived_interval.as_seconds(), current: None }
    }

    fn window_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let epoch = ts.timestamp();
        let floored = epoch.div_euclid(self.window_seconds) * self.window_seconds;
        DateTime::from_timestamp(floored, 0).unwrap_or(ts)
    }

    /// Feeds one base bar (expected in chronological order for this
    /// symbol). Returns the just-completed derived bar when `base`'s
    /// timestamp falls in a later window than the one in progress.
    pub fn push(&mut self, base: &Bar) -> Option<Bar> {
        let window_start = self.window_start(base.timestamp);

        let completed = match &self.current {
            Some(acc) if window_start > acc.start => self.current.take().map(|acc| self.emit(acc)),
            _ => None,
        };

        match &mut self.current {
            Some(acc) if acc.start == window_start => {
                acc.high = acc.high.max(base.high);
                acc.low = acc.low.min(base.low);
                acc.close = base.close;
                acc.volume += base.volume;
            }
            _ => {
                self.current = Some(WindowAcc { start: window_start, open: base.open, high: base.high, low: base.low, close: base.close, volume: base.volume });
            }
        }

        completed
    }

    /// Emits the in-progress window unconditionally, for session close.
    pub fn finalize(&mut self) -> Option<Bar> {
        self.current.take().map(|acc| self.emit(acc))
    }

    fn emit(&self, acc: WindowAcc) -> Bar {
        Bar {
            symbol: self.symbol.clone(),
            timestamp: acc.start,
            interval: self.derived_interval,
            open: acc.open,
            high: acc.high,
            low: acc.low,
            close: acc.close,
            volume: acc.volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use analysis_core::IntervalUnit;
    use chrono::TimeZone;

    use super::*;

    fn bar(secs: i64, close: f64) -> Bar {
        Bar {
            symbol: "AAPL".into(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            interval: IntervalLabel::new(1, IntervalUnit::Minute),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn does_not_emit_until_the_next_window_arrives() {
        let mut agg = DerivedAggregator::new("AAPL", IntervalLabel::new(5, IntervalUnit::Minute));
        let base = Utc.with_ymd_and_hms(2025, 7, 15, 9, 30, 0).unwrap().timestamp();
        for i in 0..5 {
            let out = agg.push(&bar(base + i * 60, 100.0 + i as f64));
            assert!(out.is_none());
        }
        // 09:35 arrives: the 09:30 window completes.
        let completed = agg.push(&bar(base + 5 * 60, 106.0));
        let completed = completed.unwrap();
        assert_eq!(completed.open, 100.0);
        assert_eq!(completed.close, 104.0);
        assert_eq!(completed.volume, 50.0);
    }

    #[test]
    fn finalize_flushes_a_dangling_window_at_session_close() {
        let mut agg = DerivedAggregator::new("AAPL", IntervalLabel::new(5, IntervalUnit::Minute));
        let base = Utc.with_ymd_and_hms(2025, 7, 15, 9, 30, 0).unwrap().timestamp();
        agg.push(&bar(base, 100.0));
        agg.push(&bar(base + 60, 101.0));
        assert!(agg.finalize().is_some());
        assert!(agg.finalize().is_none());
    }
}
