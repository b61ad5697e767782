use analysis_core::IntervalLabel;
use chrono::NaiveDate;

use crate::commands::CommandOutput;
use crate::composition::Context;

pub fn list(ctx: &Context) -> CommandOutput {
    match ctx.store.available_symbols() {
        Ok(symbols) => CommandOutput::ok_with(format!("{} symbols stored", symbols.len()), serde_json::json!({ "symbols": symbols })),
        Err(e) => CommandOutput::fail(format!("failed to list symbols: {e}")),
    }
}

pub fn info(ctx: &Context, symbol: &str) -> CommandOutput {
    let intervals = match ctx.store.available_intervals(symbol) {
        Ok(i) if !i.is_empty() => i,
        Ok(_) => return CommandOutput::fail(format!("no data stored for {symbol}")),
        Err(e) => return CommandOutput::fail(format!("failed to read intervals for {symbol}: {e}")),
    };

    let mut per_interval = Vec::new();
    for interval in &intervals {
        match ctx.store.date_range(symbol, *interval) {
            Ok(range) => per_interval.push(serde_json::json!({
                "interval": interval.to_string(),
                "start": range.map(|(s, _)| s.to_string()),
                "end": range.map(|(_, e)| e.to_string()),
            })),
            Err(e) => return CommandOutput::fail(format!("failed to read date range for {symbol}/{interval}: {e}")),
        }
    }

    CommandOutput::ok_with(format!("{symbol}: {} intervals", intervals.len()), serde_json::json!({ "symbol": symbol, "intervals": per_interval }))
}

pub fn quality_report(ctx: &Context, symbol: &str, interval: &str) -> CommandOutput {
    let interval = match IntervalLabel::normalize(interval) {
        Ok(i) => i,
        Err(e) => return CommandOutput::fail(format!("invalid interval {interval:?}: {e}")),
    };
    match ctx.facade.check_data_quality(symbol, interval) {
        Ok(snapshot) => CommandOutput::ok_with(format!("{symbol}/{interval}: {:.1}% quality", snapshot.quality_score * 100.0), serde_json::to_value(&snapshot).unwrap()),
        Err(e) => CommandOutput::fail(format!("quality check failed for {symbol}/{interval}: {e}")),
    }
}

/// Deletes stored data for a symbol, bounded by interval and/or date filters.
/// Per spec §6 ("deletion requires confirmation"), the caller must pass
/// `confirmed = true`; the command refuses (without touching disk) otherwise.
pub fn delete(
    ctx: &Context,
    symbol: &str,
    interval: Option<&str>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    confirmed: bool,
) -> CommandOutput {
    if !confirmed {
        return CommandOutput::fail(format!("deletion of {symbol} requires confirmation; pass --confirm"));
    }

    let interval = match interval.map(IntervalLabel::normalize).transpose() {
        Ok(i) => i,
        Err(e) => return CommandOutput::fail(format!("invalid interval: {e}")),
    };

    let Some(interval) = interval else {
        return CommandOutput::fail("delete requires an --interval (use delete-all to remove every interval for a symbol)".to_string());
    };

    match ctx.store.delete_interval(symbol, interval, start, end) {
        Ok(removed) => CommandOutput::ok(format!("removed {removed} partition(s) for {symbol}/{interval}")),
        Err(e) => CommandOutput::fail(format!("deletion failed for {symbol}/{interval}: {e}")),
    }
}

pub fn delete_all(ctx: &Context, symbol: &str, confirmed: bool) -> CommandOutput {
    if !confirmed {
        return CommandOutput::fail(format!("deletion of all data for {symbol} requires confirmation; pass --confirm"));
    }
    match ctx.store.delete_symbol(symbol) {
        Ok(()) => CommandOutput::ok(format!("removed all stored data for {symbol}")),
        Err(e) => CommandOutput::fail(format!("deletion failed for {symbol}: {e}")),
    }
}
