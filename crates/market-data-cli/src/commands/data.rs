use std::path::Path;

use analysis_core::IntervalLabel;
use chrono::{DateTime, Utc};
use market_data_facade::CsvImportOptions;
use session_coordinator::DerivedAggregator;

use crate::commands::CommandOutput;
use crate::composition::Context;

pub fn import_file(ctx: &Context, path: &Path, symbol: &str, interval: &str, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> CommandOutput {
    let interval = match IntervalLabel::normalize(interval) {
        Ok(i) => i,
        Err(e) => return CommandOutput::fail(format!("invalid interval: {e}")),
    };
    let options = CsvImportOptions { date_start: start, date_end: end };
    match ctx.facade.import_csv(path, symbol, interval, &options) {
        Ok(summary) => CommandOutput::ok_with(format!("imported {} of {} rows for {symbol}", summary.imported, summary.total_rows), serde_json::to_value(&summary).unwrap()),
        Err(e) => CommandOutput::fail(format!("CSV import failed: {e}")),
    }
}

pub fn import_api(ctx: &Context, data_type: &str, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CommandOutput {
    match ctx.facade.import_from_api(data_type, symbol, start, end) {
        Ok(summary) => CommandOutput::ok_with(format!("imported {} {data_type} rows for {symbol} from the provider", summary.imported), serde_json::to_value(&summary).unwrap()),
        Err(e) => CommandOutput::fail(format!("API import failed: {e}")),
    }
}

/// Exports stored bars, ticks, or quotes for a single day or range to CSV
/// (spec §6). `data_type` follows the same vocabulary as `import_from_api`:
/// an interval label, or the literal `"tick"`/`"quote"`.
pub fn export_csv(ctx: &Context, data_type: &str, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>, out_path: &Path) -> CommandOutput {
    let normalized = data_type.to_lowercase();

    let write_result: anyhow::Result<usize> = if normalized == "quote" || normalized == "quotes" {
        match ctx.facade.get_quotes(symbol, start, end, false) {
            Ok(quotes) => (|| -> anyhow::Result<usize> {
                let mut writer = csv::Writer::from_path(out_path)?;
                writer.write_record(["timestamp", "bid_price", "ask_price", "bid_size", "ask_size", "exchange", "spread"])?;
                for q in &quotes {
                    writer.write_record([
                        q.timestamp.to_rfc3339(),
                        q.bid_price.to_string(),
                        q.ask_price.to_string(),
                        q.bid_size.to_string(),
                        q.ask_size.to_string(),
                        q.exchange.clone(),
                        q.spread().to_string(),
                    ])?;
                }
                writer.flush()?;
                Ok(quotes.len())
            })(),
            Err(e) => return CommandOutput::fail(format!("export failed: {e}")),
        }
    } else if normalized == "tick" || normalized == "ticks" {
        match ctx.facade.get_ticks(symbol, start, end) {
            Ok(ticks) => (|| -> anyhow::Result<usize> {
                let mut writer = csv::Writer::from_path(out_path)?;
                writer.write_record(["timestamp", "price", "size"])?;
                for t in &ticks {
                    writer.write_record([t.timestamp.to_rfc3339(), t.price.to_string(), t.size.to_string()])?;
                }
                writer.flush()?;
                Ok(ticks.len())
            })(),
            Err(e) => return CommandOutput::fail(format!("export failed: {e}")),
        }
    } else {
        let interval = match IntervalLabel::normalize(&normalized) {
            Ok(i) => i,
            Err(e) => return CommandOutput::fail(format!("invalid data type {data_type:?}: {e}")),
        };
        match ctx.facade.get_bars(symbol, interval, start, end, false) {
            Ok(bars) => (|| -> anyhow::Result<usize> {
                let mut writer = csv::Writer::from_path(out_path)?;
                writer.write_record(["timestamp", "open", "high", "low", "close", "volume"])?;
                for b in &bars {
                    writer.write_record([b.timestamp.to_rfc3339(), b.open.to_string(), b.high.to_string(), b.low.to_string(), b.close.to_string(), b.volume.to_string()])?;
                }
                writer.flush()?;
                Ok(bars.len())
            })(),
            Err(e) => return CommandOutput::fail(format!("export failed: {e}")),
        }
    };

    match write_result {
        Ok(rows) => CommandOutput::ok(format!("exported {rows} rows to {}", out_path.display())),
        Err(e) => CommandOutput::fail(format!("failed writing CSV: {e}")),
    }
}

/// Aggregates stored bars from one interval into another, writing the
/// result back to the store (spec §6: "aggregate between stored
/// intervals"). Reuses the same windowing rule the session coordinator
/// applies to live derived bars.
pub fn aggregate(ctx: &Context, symbol: &str, from_interval: &str, to_interval: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CommandOutput {
    let from = match IntervalLabel::normalize(from_interval) {
        Ok(i) => i,
        Err(e) => return CommandOutput::fail(format!("invalid source interval: {e}")),
    };
    let to = match IntervalLabel::normalize(to_interval) {
        Ok(i) => i,
        Err(e) => return CommandOutput::fail(format!("invalid target interval: {e}")),
    };
    if to.as_seconds() <= from.as_seconds() {
        return CommandOutput::fail(format!("target interval {to} must be coarser than source interval {from}"));
    }

    let bars = match ctx.facade.get_bars(symbol, from, start, end, false) {
        Ok(b) => b,
        Err(e) => return CommandOutput::fail(format!("failed to read source bars: {e}")),
    };
    if bars.is_empty() {
        return CommandOutput::fail(format!("no {from} bars stored for {symbol} in range"));
    }

    let mut aggregator = DerivedAggregator::new(symbol, to);
    let mut derived = Vec::new();
    for bar in &bars {
        if let Some(done) = aggregator.push(bar) {
            derived.push(done);
        }
    }
    if let Some(last) = aggregator.finalize() {
        derived.push(last);
    }

    let exchange_tz = ctx.time.market_timezone(&ctx.config.exchange_group);
    let exchange_tz = match exchange_tz {
        Ok(tz) => tz,
        Err(e) => return CommandOutput::fail(format!("failed to resolve exchange timezone: {e}")),
    };
    let day_of = move |ts: DateTime<Utc>| ts.with_timezone(&exchange_tz).date_naive();
    match ctx.store.write_bars(symbol, to, &derived, exchange_tz, &day_of) {
        Ok(written) => CommandOutput::ok(format!("aggregated {} {from} bars into {written} {to} bars for {symbol}", bars.len())),
        Err(e) => CommandOutput::fail(format!("failed to write aggregated bars: {e}")),
    }
}
