use thiserror::Error;

/// Shared error taxonomy (spec §7), used by every crate in the workspace so
/// that the coordinator's run-loop can match on a single set of variants
/// when deciding whether a failure is fatal.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Unknown exchange, missing market hours, malformed session config.
    /// Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// User-supplied date wrong format, interval unparsable, speed < 0,
    /// `start_date >= end_date`, negative `n` in trading-day navigation.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// No bars for requested range/symbol/interval. Non-fatal for reads.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Simulated clock exceeds market close; duplicate stream registered;
    /// unknown indicator name. Fatal: terminates the coordinator.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// `set_backtest_time` called in live mode, or similar. Non-fatal;
    /// the operation is a no-op with a warning.
    #[error("mode mismatch: {0}")]
    ModeMismatch(String),

    /// Not enough bars to satisfy an indicator's warm-up requirement.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("calculation error: {0}")]
    CalculationError(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown error: {0}")]
    Unknown(String),
}
