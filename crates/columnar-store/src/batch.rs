use std::sync::Arc;

use analysis_core::{AnalysisError, Bar, IntervalLabel, Quote};
use arrow::array::{Array, Float64Array, Int64Array, RecordBatch, StringArray, TimestampMicrosecondArray};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::schema::{bar_schema, quote_schema};

/// Converts a UTC instant to the exchange-local wall-clock value stored on
/// disk: the local naive datetime, reinterpreted as if it were itself a UTC
/// instant. This is what makes `09:30 America/New_York` read back as
/// `09:30`, not `14:30`, regardless of what zone the reading process runs in.
fn local_micros(ts: DateTime<Utc>, tz: Tz) -> i64 {
    let local_naive = ts.with_timezone(&tz).naive_local();
    Utc.from_utc_datetime(&local_naive).timestamp_micros()
}

/// Reverses `local_micros`: treats the stored instant's naive component as
/// exchange-local wall-clock time and resolves it back to a real UTC instant.
/// Falls back to interpreting the naive value as already-UTC on a DST
/// ambiguity or gap, mirroring `session-coordinator::historical::day_bounds`.
fn from_local_micros(us: i64, tz: Tz) -> Result<DateTime<Utc>, AnalysisError> {
    let stored = Utc
        .timestamp_micros(us)
        .single()
        .ok_or_else(|| AnalysisError::InvalidData(format!("out-of-range timestamp: {us}us")))?;
    let local_naive = stored.naive_utc();
    let resolved = tz
        .from_local_datetime(&local_naive)
        .single()
        .unwrap_or_else(|| tz.from_utc_datetime(&local_naive));
    Ok(resolved.with_timezone(&Utc))
}

pub fn bars_to_batch(bars: &[Bar], tz: Tz) -> Result<RecordBatch, AnalysisError> {
    let symbol: StringArray = bars.iter().map(|b| Some(b.symbol.as_str())).collect();
    let timestamp = TimestampMicrosecondArray::from_iter_values(bars.iter().map(|b| local_micros(b.timestamp, tz)))
        .with_timezone(tz.name());
    let open: Float64Array = bars.iter().map(|b| Some(b.open)).collect();
    let high: Float64Array = bars.iter().map(|b| Some(b.high)).collect();
    let low: Float64Array = bars.iter().map(|b| Some(b.low)).collect();
    let close: Float64Array = bars.iter().map(|b| Some(b.close)).collect();
    let volume: Int64Array = bars.iter().map(|b| Some(b.volume.round() as i64)).collect();

    RecordBatch::try_new(
        bar_schema(tz),
        vec![
            Arc::new(symbol),
            Arc::new(timestamp),
            Arc::new(open),
            Arc::new(high),
            Arc::new(low),
            Arc::new(close),
            Arc::new(volume),
        ],
    )
    .map_err(|e| AnalysisError::InvalidData(format!("failed to build bar batch: {e}")))
}

pub fn batch_to_bars(batch: &RecordBatch, interval: IntervalLabel, tz: Tz) -> Result<Vec<Bar>, AnalysisError> {
    let malformed = || AnalysisError::InvalidData("bar partition file has unexpected schema".into());

    let symbol = batch.column(0).as_any().downcast_ref::<StringArray>().ok_or_else(malformed)?;
    let timestamp = batch
        .column(1)
        .as_any()
        .downcast_ref::<TimestampMicrosecondArray>()
        .ok_or_else(malformed)?;
    let open = batch.column(2).as_any().downcast_ref::<Float64Array>().ok_or_else(malformed)?;
    let high = batch.column(3).as_any().downcast_ref::<Float64Array>().ok_or_else(malformed)?;
    let low = batch.column(4).as_any().downcast_ref::<Float64Array>().ok_or_else(malformed)?;
    let close = batch.column(5).as_any().downcast_ref::<Float64Array>().ok_or_else(malformed)?;
    let volume = batch.column(6).as_any().downcast_ref::<Int64Array>().ok_or_else(malformed)?;

    (0..batch.num_rows())
        .map(|i| {
            Ok(Bar {
                symbol: symbol.value(i).to_string(),
                timestamp: from_local_micros(timestamp.value(i), tz)?,
                interval,
                open: open.value(i),
                high: high.value(i),
                low: low.value(i),
                close: close.value(i),
                volume: volume.value(i) as f64,
            })
        })
        .collect()
}

pub fn quotes_to_batch(quotes: &[Quote], tz: Tz) -> Result<RecordBatch, AnalysisError> {
    let symbol: StringArray = quotes.iter().map(|q| Some(q.symbol.as_str())).collect();
    let timestamp = TimestampMicrosecondArray::from_iter_values(quotes.iter().map(|q| local_micros(q.timestamp, tz)))
        .with_timezone(tz.name());
    let bid_price: Float64Array = quotes.iter().map(|q| Some(q.bid_price)).collect();
    let ask_price: Float64Array = quotes.iter().map(|q| Some(q.ask_price)).collect();
    let bid_size: Float64Array = quotes.iter().map(|q| Some(q.bid_size)).collect();
    let ask_size: Float64Array = quotes.iter().map(|q| Some(q.ask_size)).collect();
    let exchange: StringArray = quotes.iter().map(|q| Some(q.exchange.as_str())).collect();
    let spread: Float64Array = quotes.iter().map(|q| Some(q.spread())).collect();

    RecordBatch::try_new(
        quote_schema(tz),
        vec![
            Arc::new(symbol),
            Arc::new(timestamp),
            Arc::new(bid_price),
            Arc::new(ask_price),
            Arc::new(bid_size),
            Arc::new(ask_size),
            Arc::new(exchange),
            Arc::new(spread),
        ],
    )
    .map_err(|e| AnalysisError::InvalidData(format!("failed to build quote batch: {e}")))
}

pub fn batch_to_quotes(batch: &RecordBatch, tz: Tz) -> Result<Vec<Quote>, AnalysisError> {
    let malformed = || AnalysisError::InvalidData("quote partition file has unexpected schema".into());

    let symbol = batch.column(0).as_any().downcast_ref::<StringArray>().ok_or_else(malformed)?;
    let timestamp = batch
        .column(1)
        .as_any()
        .downcast_ref::<TimestampMicrosecondArray>()
        .ok_or_else(malformed)?;
    let bid_price = batch.column(2).as_any().downcast_ref::<Float64Array>().ok_or_else(malformed)?;
    let ask_price = batch.column(3).as_any().downcast_ref::<Float64Array>().ok_or_else(malformed)?;
    let bid_size = batch.column(4).as_any().downcast_ref::<Float64Array>().ok_or_else(malformed)?;
    let ask_size = batch.column(5).as_any().downcast_ref::<Float64Array>().ok_or_else(malformed)?;
    let exchange = batch.column(6).as_any().downcast_ref::<StringArray>().ok_or_else(malformed)?;
    // `spread` (column 7) is schema-mandated but derivable from bid/ask; it
    // is write-only, validated here for shape but not carried into `Quote`.
    let _spread = batch.column(7).as_any().downcast_ref::<Float64Array>().ok_or_else(malformed)?;

    (0..batch.num_rows())
        .map(|i| {
            Ok(Quote {
                symbol: symbol.value(i).to_string(),
                timestamp: from_local_micros(timestamp.value(i), tz)?,
                bid_price: bid_price.value(i),
                ask_price: ask_price.value(i),
                bid_size: bid_size.value(i),
                ask_size: ask_size.value(i),
                exchange: exchange.value(i).to_string(),
            })
        })
        .collect()
}
