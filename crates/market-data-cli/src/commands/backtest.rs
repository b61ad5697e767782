use chrono::NaiveDate;
use time_service::TimeMode;

use crate::commands::CommandOutput;
use crate::composition::Context;

/// Runs a full backtest session, optionally overriding the configured
/// speed multiplier and/or backtest window (spec §6: "set backtest speed",
/// "set backtest window"). Since this process is one-shot rather than a
/// long-lived service, these two operations are applied as overrides at
/// run time instead of mutating a standing configuration.
pub fn run(ctx: &Context, speed_override: Option<f64>, start_override: Option<NaiveDate>, end_override: Option<NaiveDate>) -> CommandOutput {
    if ctx.time.mode() != TimeMode::Backtest {
        return CommandOutput::fail("backtest run requires the engine to be started in backtest mode");
    }

    let mut session_config = match ctx.config.build_session_config() {
        Ok(c) => c,
        Err(e) => return CommandOutput::fail(format!("invalid session configuration: {e}")),
    };
    if let Some(speed) = speed_override {
        session_config.speed_multiplier = speed;
    }
    if let Some(start) = start_override {
        session_config.backtest_start_date = start;
    }
    if let Some(end) = end_override {
        session_config.backtest_end_date = end;
    }

    let coordinator = match session_coordinator::SessionCoordinator::new(
        ctx.facade.clone(),
        ctx.time.clone(),
        ctx.state.clone(),
        ctx.replay.clone(),
        ctx.indicators.clone(),
        session_config,
        ctx.config.live_indicators(),
    ) {
        Ok(c) => c,
        Err(e) => return CommandOutput::fail(format!("failed to start session coordinator: {e}")),
    };

    match coordinator.run_backtest() {
        Ok(()) => CommandOutput::ok(format!("backtest finished: {} trading days completed", coordinator.trading_days_completed())),
        Err(e) => CommandOutput::fail(format!("backtest aborted: {e}")),
    }
}
