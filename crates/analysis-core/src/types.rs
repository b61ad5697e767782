use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, IntervalLabel};

/// OHLCV bar. `timestamp` denotes the bar's *start*, in the exchange's local
/// timezone wherever it is persisted or compared against session hours; in
/// memory it is carried as `DateTime<Utc>` and converted at the edges
/// (columnar-store, time-service) rather than smuggling a naive-local
/// representation through the core types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub interval: IntervalLabel,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Validates the invariants from spec §3: `low <= min(open, close) <=
    /// max(open, close) <= high` and `volume >= 0`.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let lo = self.open.min(self.close);
        let hi = self.open.max(self.close);
        if !(self.low <= lo && lo <= hi && hi <= self.high) {
            return Err(AnalysisError::InvalidData(format!(
                "{} {} bar at {} violates OHLC ordering: O={} H={} L={} C={}",
                self.symbol, self.interval, self.timestamp, self.open, self.high, self.low, self.close
            )));
        }
        if self.volume < 0.0 {
            return Err(AnalysisError::InvalidData(format!(
                "{} {} bar at {} has negative volume {}",
                self.symbol, self.interval, self.timestamp, self.volume
            )));
        }
        Ok(())
    }
}

/// Trade tick. Input-only: ticks are never persisted directly, only
/// aggregated into 1-second bars by `columnar-store`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub size: f64,
}

impl Tick {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.price <= 0.0 {
            return Err(AnalysisError::InvalidData(format!(
                "{} tick at {} has non-positive price {}",
                self.symbol, self.timestamp, self.price
            )));
        }
        if self.size < 0.0 {
            return Err(AnalysisError::InvalidData(format!(
                "{} tick at {} has negative size {}",
                self.symbol, self.timestamp, self.size
            )));
        }
        Ok(())
    }
}

/// Bid/ask quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    pub exchange: String,
}

impl Quote {
    pub fn spread(&self) -> f64 {
        self.ask_price - self.bid_price
    }

    /// A quote is valid if both prices are present (i.e. finite and
    /// positive) and the spread is non-negative.
    pub fn is_valid(&self) -> bool {
        self.bid_price.is_finite()
            && self.ask_price.is_finite()
            && self.bid_price > 0.0
            && self.ask_price > 0.0
            && self.spread() >= 0.0
    }
}
