pub mod csv_import;
pub mod facade;
pub mod streaming;
pub mod types;

pub use facade::{normalize_interval, MarketDataFacade};
pub use streaming::{start_all_streams, start_bar_streams, start_quote_streams, start_tick_streams};
pub use types::{CsvImportOptions, ImportSummary, QualitySnapshot};
