use analysis_core::{Bar, IntervalLabel};
use chrono::{DateTime, Utc};

use crate::commands::CommandOutput;
use crate::composition::Context;

fn high_low(bars: &[Bar]) -> Option<(f64, f64)> {
    if bars.is_empty() {
        return None;
    }
    let high = bars.iter().fold(f64::MIN, |acc, b| acc.max(b.high));
    let low = bars.iter().fold(f64::MAX, |acc, b| acc.min(b.low));
    Some((high, low))
}

/// Total volume traded so far in the current session (spec §6), read
/// straight from in-memory `SessionState` rather than the store — the
/// coordinator appends to it live.
pub fn session_volume(ctx: &Context, symbol: &str, interval: &str) -> CommandOutput {
    let interval = match IntervalLabel::normalize(interval) {
        Ok(i) => i,
        Err(e) => return CommandOutput::fail(format!("invalid interval: {e}")),
    };
    let Some(total) = ctx.state.with_bars_ref(symbol, interval, false, |bars| bars.iter().map(|b| b.volume).sum::<f64>()) else {
        return CommandOutput::fail(format!("no session data for {symbol}/{interval}"));
    };
    CommandOutput::ok_with(format!("{symbol}/{interval} session volume: {total}"), serde_json::json!({ "volume": total }))
}

pub fn session_high_low(ctx: &Context, symbol: &str, interval: &str) -> CommandOutput {
    let interval = match IntervalLabel::normalize(interval) {
        Ok(i) => i,
        Err(e) => return CommandOutput::fail(format!("invalid interval: {e}")),
    };
    let Some(result) = ctx.state.with_bars_ref(symbol, interval, false, |bars| high_low(bars)) else {
        return CommandOutput::fail(format!("no session data for {symbol}/{interval}"));
    };
    match result {
        Some((high, low)) => CommandOutput::ok_with(format!("{symbol}/{interval} session range: {low}-{high}"), serde_json::json!({ "high": high, "low": low })),
        None => CommandOutput::fail(format!("no bars in current session for {symbol}/{interval}")),
    }
}

/// High/low over a stored historical range (spec §6), read from
/// `ColumnarStore` rather than the live session window.
pub fn historical_high_low(ctx: &Context, symbol: &str, interval: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CommandOutput {
    let interval = match IntervalLabel::normalize(interval) {
        Ok(i) => i,
        Err(e) => return CommandOutput::fail(format!("invalid interval: {e}")),
    };
    let bars = match ctx.facade.get_bars(symbol, interval, start, end, false) {
        Ok(b) => b,
        Err(e) => return CommandOutput::fail(format!("failed to read bars: {e}")),
    };
    match high_low(&bars) {
        Some((high, low)) => CommandOutput::ok_with(format!("{symbol}/{interval} range {start}..{end}: {low}-{high}"), serde_json::json!({ "high": high, "low": low, "bars": bars.len() })),
        None => CommandOutput::fail(format!("no stored bars for {symbol}/{interval} in range")),
    }
}

pub fn average_volume(ctx: &Context, symbol: &str, interval: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CommandOutput {
    let interval = match IntervalLabel::normalize(interval) {
        Ok(i) => i,
        Err(e) => return CommandOutput::fail(format!("invalid interval: {e}")),
    };
    let bars = match ctx.facade.get_bars(symbol, interval, start, end, false) {
        Ok(b) => b,
        Err(e) => return CommandOutput::fail(format!("failed to read bars: {e}")),
    };
    if bars.is_empty() {
        return CommandOutput::fail(format!("no stored bars for {symbol}/{interval} in range"));
    }
    let average = bars.iter().map(|b| b.volume).sum::<f64>() / bars.len() as f64;
    CommandOutput::ok_with(format!("{symbol}/{interval} average volume over {} bars: {average}", bars.len()), serde_json::json!({ "average_volume": average, "bars": bars.len() }))
}

/// Reports how many bars have accumulated in the current session for a
/// (symbol, interval), matching `data_commands.py`'s delta-progress
/// counter (SPEC_FULL §2).
pub fn delta_cursor(ctx: &Context, symbol: &str, interval: &str) -> CommandOutput {
    let interval = match IntervalLabel::normalize(interval) {
        Ok(i) => i,
        Err(e) => return CommandOutput::fail(format!("invalid interval: {e}")),
    };
    let cursor = ctx.state.delta_cursor(symbol, interval);
    CommandOutput::ok_with(format!("{symbol}/{interval} delta cursor: {cursor}"), serde_json::json!({ "cursor": cursor }))
}
