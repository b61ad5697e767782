use chrono::NaiveDate;

use crate::commands::CommandOutput;
use crate::composition::Context;

pub fn current_time(ctx: &Context) -> CommandOutput {
    let now = ctx.time.current_time(None);
    CommandOutput::ok_with(format!("current time: {now}"), serde_json::json!({ "time": now.to_rfc3339() }))
}

pub fn trading_session(ctx: &Context, date: NaiveDate) -> CommandOutput {
    let session = ctx.time.trading_session(date, &ctx.config.exchange_group, &ctx.config.asset_class);
    CommandOutput::ok_with(
        format!("{date}: trading_day={} holiday={} early_close={}", session.is_trading_day, session.is_holiday, session.is_early_close),
        serde_json::to_value(&session).unwrap(),
    )
}

pub fn next_trading_date(ctx: &Context, from: NaiveDate, n: u32) -> CommandOutput {
    match ctx.time.next_trading_date(from, n) {
        Ok(date) => CommandOutput::ok_with(format!("{n}th trading day after {from}: {date}"), serde_json::json!({ "date": date.to_string() })),
        Err(e) => CommandOutput::fail(format!("next_trading_date failed: {e}")),
    }
}

pub fn previous_trading_date(ctx: &Context, from: NaiveDate, n: u32) -> CommandOutput {
    match ctx.time.previous_trading_date(from, n) {
        Ok(date) => CommandOutput::ok_with(format!("{n}th trading day before {from}: {date}"), serde_json::json!({ "date": date.to_string() })),
        Err(e) => CommandOutput::fail(format!("previous_trading_date failed: {e}")),
    }
}

pub fn count_trading_days(ctx: &Context, start: NaiveDate, end: NaiveDate) -> CommandOutput {
    match ctx.time.count_trading_days(start, end) {
        Ok(count) => CommandOutput::ok_with(format!("{count} trading days between {start} and {end}"), serde_json::json!({ "count": count })),
        Err(e) => CommandOutput::fail(format!("count_trading_days failed: {e}")),
    }
}

pub fn cache_stats(ctx: &Context) -> CommandOutput {
    let stats = ctx.time.cache_stats();
    CommandOutput::ok_with("trading session cache stats", serde_json::json!({ "hits": stats.hits, "misses": stats.misses }))
}

pub fn invalidate_cache(ctx: &Context) -> CommandOutput {
    ctx.time.invalidate_cache();
    CommandOutput::ok("trading session cache invalidated")
}
