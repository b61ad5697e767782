use analysis_core::IntervalLabel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityLevel {
    /// Every expected bar for the window is present.
    Complete,
    /// Some expected bars are missing but most of the window is present.
    Degraded,
    /// Too little of the window is present to trust derived analytics.
    Insufficient,
}

impl QualityLevel {
    /// Below this completeness ratio a window is `Insufficient` rather
    /// than merely `Degraded`.
    const INSUFFICIENT_THRESHOLD: f64 = 0.5;

    pub fn from_completeness(completeness: f64) -> Self {
        if completeness >= 1.0 {
            QualityLevel::Complete
        } else if completeness >= Self::INSUFFICIENT_THRESHOLD {
            QualityLevel::Degraded
        } else {
            QualityLevel::Insufficient
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub symbol: String,
    pub interval: IntervalLabel,
    pub expected: usize,
    pub observed: usize,
    pub completeness: f64,
    pub level: QualityLevel,
    pub gaps: Vec<DateTime<Utc>>,
}
