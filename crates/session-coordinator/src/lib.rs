pub mod config;
pub mod coordinator;
pub mod derive;
pub mod historical;
pub mod stream_plan;

pub use config::{ApplyTo, HistoricalConfig, SessionConfig, SymbolStreamRequest};
pub use coordinator::SessionCoordinator;
pub use derive::DerivedAggregator;
pub use historical::{load_historical, SymbolHistoricalSummary};
pub use stream_plan::SymbolStreamPlan;
