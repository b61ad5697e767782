use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Options accepted by `import_csv`. Column names are matched
/// case-insensitively against the CSV header; `date_start`/`date_end`
/// filter rows before they are handed to the store.
#[derive(Debug, Clone, Default)]
pub struct CsvImportOptions {
    pub date_start: Option<DateTime<Utc>>,
    pub date_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    pub symbol: String,
    pub total_rows: usize,
    pub imported: usize,
    pub skipped: usize,
}

/// Naive, cheap-to-compute quality snapshot: a duplicate-timestamp count and
/// a date range, distinct from `quality-engine`'s calendar-aware
/// expected-vs-observed scoring used by the session coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySnapshot {
    pub total_bars: usize,
    pub duplicate_timestamps: usize,
    pub quality_score: f64,
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}
