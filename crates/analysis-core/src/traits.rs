use chrono::{DateTime, Utc};

use crate::{AnalysisError, Bar, IntervalLabel, Quote, Tick};

/// A source of market data the facade can pull from when the store doesn't
/// have what's asked for (live-mode latest-bar queries, or an explicit
/// `import_from_api`). Implemented by `polygon-client`; the WebSocket/HTTP
/// wire formats of any other vendor are an external collaborator and are
/// reached only through this trait.
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Short identifier used for provider selection and error messages
    /// ("polygon").
    fn name(&self) -> &str;

    /// Cheap round-trip used by the facade before relying on a provider for
    /// live queries or an `import_from_api` call.
    async fn check_connectivity(&self) -> Result<(), AnalysisError>;

    /// Historical bars in `[start, end]`. `interval` maps to whatever
    /// aggregation window the provider's wire API expects.
    async fn fetch_bars(
        &self,
        symbol: &str,
        interval: IntervalLabel,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, AnalysisError>;

    /// Most recent bar for `interval`, used by live-mode `get_latest_bar`
    /// to bypass the store.
    async fn fetch_latest_bar(&self, symbol: &str, interval: IntervalLabel) -> Result<Option<Bar>, AnalysisError>;

    /// Historical trades in `[start, end]`, aggregated by the facade via
    /// `aggregate_ticks_to_1s` before being written through as 1s bars.
    async fn fetch_ticks(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Tick>, AnalysisError>;

    /// Historical NBBO quotes in `[start, end]`.
    async fn fetch_quotes(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Quote>, AnalysisError>;
}

/// Pure function signature for a derived-bar aggregator: folds a
/// chronologically-contiguous run of base bars into one bar at a coarser
/// interval. Implemented by `quality-engine`'s derived aggregation and
/// reused by `columnar-store` for tick/quote aggregation call sites that
/// share the fold shape.
pub trait BarFold {
    fn fold(bars: &[Bar]) -> Option<Bar>;
}
