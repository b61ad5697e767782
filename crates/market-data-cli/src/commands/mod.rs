pub mod backtest;
pub mod data;
pub mod query;
pub mod symbol;
pub mod time_cmds;

use serde::Serialize;

/// The tagged result shape from spec §6: user-driven failures (bad symbol,
/// no data, unconfirmed deletion) are reported through this rather than
/// propagated as a process-fatal error, so a caller driving many commands in
/// one session can keep going after one fails.
#[derive(Debug, Serialize)]
pub struct CommandOutput {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandOutput {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into(), data: None }
    }

    pub fn ok_with(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self { success: true, message: message.into(), data: Some(data) }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), data: None }
    }

    pub fn print(&self) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => println!("{json}"),
            Err(_) => println!("{}", self.message),
        }
    }
}
