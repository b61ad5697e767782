use std::collections::BTreeSet;

use analysis_core::{Bar, IntervalLabel};
use chrono::{DateTime, Utc};

use crate::types::{QualityLevel, QualityReport};

/// Scores observed bars against the schedule of timestamps a caller
/// expects for the window (typically built by the coordinator from
/// `TimeService` session boundaries and the interval length). The last
/// expected timestamp is dropped when `bar_in_progress` is true: an
/// incomplete current-session bar shouldn't count as a gap.
pub fn score(
    symbol: &str,
    interval: IntervalLabel,
    mut expected_timestamps: Vec<DateTime<Utc>>,
    observed: &[Bar],
    bar_in_progress: bool,
) -> QualityReport {
    if bar_in_progress {
        expected_timestamps.pop();
    }
    let observed_set: BTreeSet<DateTime<Utc>> = observed.iter().map(|b| b.timestamp).collect();
    let gaps: Vec<DateTime<Utc>> = expected_timestamps.iter().filter(|ts| !observed_set.contains(ts)).copied().collect();

    let expected = expected_timestamps.len();
    let observed_count = expected.saturating_sub(gaps.len());
    let completeness = if expected == 0 { 1.0 } else { observed_count as f64 / expected as f64 };

    QualityReport {
        symbol: symbol.to_string(),
        interval,
        expected,
        observed: observed_count,
        completeness,
        level: QualityLevel::from_completeness(completeness),
        gaps,
    }
}

#[cfg(test)]
mod tests {
    use analysis_core::IntervalUnit;
    use chrono::TimeZone;

    use super::*;

    fn bar(secs: i64) -> Bar {
        Bar {
            symbol: "AAPL".into(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            interval: IntervalLabel::new(1, IntervalUnit::Minute),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        }
    }

    #[test]
    fn full_coverage_is_complete() {
        let expected = vec![Utc.timestamp_opt(0, 0).unwrap(), Utc.timestamp_opt(60, 0).unwrap()];
        let observed = vec![bar(0), bar(60)];
        let report = score("AAPL", IntervalLabel::new(1, IntervalUnit::Minute), expected, &observed, false);
        assert_eq!(report.level, QualityLevel::Complete);
        assert!(report.gaps.is_empty());
    }

    #[test]
    fn missing_bars_are_flagged_as_gaps() {
        let expected = vec![
            Utc.timestamp_opt(0, 0).unwrap(),
            Utc.timestamp_opt(60, 0).unwrap(),
            Utc.timestamp_opt(120, 0).unwrap(),
            Utc.timestamp_opt(180, 0).unwrap(),
        ];
        let observed = vec![bar(0), bar(180)];
        let report = score("AAPL", IntervalLabel::new(1, IntervalUnit::Minute), expected, &observed, false);
        assert_eq!(report.gaps.len(), 2);
        assert_eq!(report.level, QualityLevel::Degraded);
    }

    #[test]
    fn in_progress_bar_is_not_a_gap() {
        let expected = vec![Utc.timestamp_opt(0, 0).unwrap(), Utc.timestamp_opt(60, 0).unwrap()];
        let observed = vec![bar(0)];
        let report = score("AAPL", IntervalLabel::new(1, IntervalUnit::Minute), expected, &observed, true);
        assert_eq!(report.level, QualityLevel::Complete);
    }
}
