use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use chrono_tz::Tz;

/// Arrow schema for a bar partition file. `timestamp` holds exchange-local
/// wall-clock time (spec §4.2: "no UTC conversion on read or write"), tagged
/// with the exchange's own IANA zone name rather than `"UTC"`.
pub fn bar_schema(tz: Tz) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("symbol", DataType::Utf8, false),
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Microsecond, Some(tz.name().into())),
            false,
        ),
        Field::new("open", DataType::Float64, false),
        Field::new("high", DataType::Float64, false),
        Field::new("low", DataType::Float64, false),
        Field::new("close", DataType::Float64, false),
        Field::new("volume", DataType::Int64, false),
    ]))
}

pub fn quote_schema(tz: Tz) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("symbol", DataType::Utf8, false),
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Microsecond, Some(tz.name().into())),
            false,
        ),
        Field::new("bid_price", DataType::Float64, false),
        Field::new("ask_price", DataType::Float64, false),
        Field::new("bid_size", DataType::Float64, false),
        Field::new("ask_size", DataType::Float64, false),
        Field::new("exchange", DataType::Utf8, false),
        Field::new("spread", DataType::Float64, false),
    ]))
}
