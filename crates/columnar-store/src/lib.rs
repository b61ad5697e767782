pub mod aggregate;
pub mod batch;
pub mod catalog;
pub mod io;
pub mod partition;
pub mod schema;
pub mod store;

pub use aggregate::{aggregate_quotes_by_second, aggregate_ticks_to_1s};
pub use store::{ColumnarStore, DayOf};
