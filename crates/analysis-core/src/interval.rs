//! Interval labels (`"1s"`, `"5m"`, `"1d"`, `"2w"`) and the granularity rules
//! that key off them throughout the store and the session layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// The unit of an interval label. `Hour` is deliberately absent: callers
/// express an hour as `"60m"`, per spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalUnit {
    Second,
    Minute,
    Day,
    Week,
}

impl IntervalUnit {
    fn suffix(self) -> char {
        match self {
            IntervalUnit::Second => 's',
            IntervalUnit::Minute => 'm',
            IntervalUnit::Day => 'd',
            IntervalUnit::Week => 'w',
        }
    }
}

/// A parsed interval label, e.g. `5m` -> `IntervalLabel { n: 5, unit: Minute }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IntervalLabel {
    pub n: u32,
    pub unit: IntervalUnit,
}

impl IntervalLabel {
    pub const fn new(n: u32, unit: IntervalUnit) -> Self {
        Self { n, unit }
    }

    /// Whether this interval is stored as daily (session-aligned) files
    /// rather than yearly files. Pure function of the label, per spec §4.2.
    pub fn is_sub_daily(&self) -> bool {
        matches!(self.unit, IntervalUnit::Second | IntervalUnit::Minute)
    }

    /// Length of the interval expressed in whole seconds, where representable.
    /// Week/day intervals are calendar-based and not meaningfully expressed
    /// as a fixed second count for window aggregation across DST-sensitive
    /// spans, so callers computing derived bars should only call this for
    /// sub-daily intervals.
    pub fn as_seconds(&self) -> i64 {
        let n = self.n as i64;
        match self.unit {
            IntervalUnit::Second => n,
            IntervalUnit::Minute => n * 60,
            IntervalUnit::Day => n * 86_400,
            IntervalUnit::Week => n * 7 * 86_400,
        }
    }

    /// Integer-vs-label normalization from spec §4.3: a bare integer is
    /// `"Nm"`; the literal token `"tick"` is rewritten to `"1s"`.
    pub fn normalize(raw: &str) -> Result<Self, AnalysisError> {
        if raw.eq_ignore_ascii_case("tick") {
            return Ok(IntervalLabel::new(1, IntervalUnit::Second));
        }
        if let Ok(n) = raw.parse::<u32>() {
            if n == 0 {
                return Err(AnalysisError::InvalidData(
                    "interval must be a positive integer".into(),
                ));
            }
            return Ok(IntervalLabel::new(n, IntervalUnit::Minute));
        }
        raw.parse()
    }
}

impl FromStr for IntervalLabel {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || AnalysisError::InvalidData(format!("malformed interval label: {s}"));
        if s.len() < 2 {
            return Err(invalid());
        }
        let (digits, suffix) = s.split_at(s.len() - 1);
        let n: u32 = digits.parse().map_err(|_| invalid())?;
        if n == 0 {
            return Err(invalid());
        }
        let unit = match suffix {
            "s" => IntervalUnit::Second,
            "m" => IntervalUnit::Minute,
            "d" => IntervalUnit::Day,
            "w" => IntervalUnit::Week,
            "h" => {
                return Err(AnalysisError::InvalidData(
                    "hour intervals are forbidden; express hours as minutes (e.g. \"60m\")".into(),
                ))
            }
            _ => return Err(invalid()),
        };
        Ok(IntervalLabel::new(n, unit))
    }
}

impl fmt::Display for IntervalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.n, self.unit.suffix())
    }
}

impl TryFrom<String> for IntervalLabel {
    type Error = AnalysisError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IntervalLabel> for String {
    fn from(value: IntervalLabel) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_labels() {
        assert_eq!("5m".parse::<IntervalLabel>().unwrap(), IntervalLabel::new(5, IntervalUnit::Minute));
        assert_eq!("1d".parse::<IntervalLabel>().unwrap(), IntervalLabel::new(1, IntervalUnit::Day));
        assert_eq!("2w".parse::<IntervalLabel>().unwrap(), IntervalLabel::new(2, IntervalUnit::Week));
        assert_eq!("30s".parse::<IntervalLabel>().unwrap(), IntervalLabel::new(30, IntervalUnit::Second));
    }

    #[test]
    fn rejects_hours() {
        assert!("1h".parse::<IntervalLabel>().is_err());
    }

    #[test]
    fn normalizes_bare_integers_and_tick() {
        assert_eq!(IntervalLabel::normalize("5").unwrap(), IntervalLabel::new(5, IntervalUnit::Minute));
        assert_eq!(IntervalLabel::normalize("tick").unwrap(), IntervalLabel::new(1, IntervalUnit::Second));
        assert_eq!(IntervalLabel::normalize("1s").unwrap(), IntervalLabel::new(1, IntervalUnit::Second));
    }

    #[test]
    fn sub_daily_classification() {
        assert!(IntervalLabel::new(1, IntervalUnit::Second).is_sub_daily());
        assert!(IntervalLabel::new(5, IntervalUnit::Minute).is_sub_daily());
        assert!(!IntervalLabel::new(1, IntervalUnit::Day).is_sub_daily());
        assert!(!IntervalLabel::new(1, IntervalUnit::Week).is_sub_daily());
    }

    #[test]
    fn display_round_trips() {
        for s in ["1s", "5m", "1d", "2w", "250m"] {
            let parsed: IntervalLabel = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }
}
