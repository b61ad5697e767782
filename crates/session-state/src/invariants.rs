use analysis_core::IntervalLabel;

use crate::types::SymbolSessionData;

#[derive(Debug, Clone, PartialEq)]
pub struct InvariantViolation {
    pub symbol: String,
    pub interval: Option<IntervalLabel>,
    pub message: String,
}

/// Re-derives the invariants a working set must hold and reports every
/// violation found, rather than stopping at the first one — callers
/// (session metrics, diagnostics dumps) want the whole picture.
pub fn check(data: &SymbolSessionData) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (interval, interval_data) in &data.intervals {
        check_bars(data, *interval, &interval_data.bars, &mut violations);
    }
    for by_interval in data.historical.values() {
        for (interval, bars) in by_interval {
            check_bars(data, *interval, bars, &mut violations);
        }
    }

    violations
}

fn check_bars(data: &SymbolSessionData, interval: IntervalLabel, bars: &[analysis_core::Bar], violations: &mut Vec<InvariantViolation>) {
    let mut prev_ts = None;
    for bar in bars {
        if bar.symbol != data.symbol {
            violations.push(InvariantViolation {
                symbol: data.symbol.clone(),
                interval: Some(interval),
                message: format!("bar at {} carries symbol {} in {} working set", bar.timestamp, bar.symbol, data.symbol),
            });
        }
        if bar.interval != interval {
            violations.push(InvariantViolation {
                symbol: data.symbol.clone(),
                interval: Some(interval),
                message: format!("bar at {} carries interval {} under {interval} bucket", bar.timestamp, bar.interval),
            });
        }
        if let Err(e) = bar.validate() {
            violations.push(InvariantViolation {
                symbol: data.symbol.clone(),
                interval: Some(interval),
                message: e.to_string(),
            });
        }
        if let Some(prev) = prev_ts {
            if bar.timestamp <= prev {
                violations.push(InvariantViolation {
                    symbol: data.symbol.clone(),
                    interval: Some(interval),
                    message: format!("bars out of order or duplicated at {}", bar.timestamp),
                });
            }
        }
        prev_ts = Some(bar.timestamp);
    }
}
