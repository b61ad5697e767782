use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A group of exchanges sharing one timezone and trading calendar, e.g.
/// `US_EQUITY` covers NYSE, NASDAQ, AMEX, ARCA in `America/New_York`.
pub type ExchangeGroup = String;
pub type AssetClass = String;

/// Per (exchange_group, asset_class) session-hour configuration. Loaded once
/// at startup and treated as immutable at runtime (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketHoursConfig {
    pub exchange_group: ExchangeGroup,
    pub asset_class: AssetClass,
    pub timezone: Tz,
    /// Sunday = index 0 .. Saturday = index 6; `true` means the exchange
    /// trades that weekday absent a holiday.
    pub weekday_mask: [bool; 7],
    pub pre_open: NaiveTime,
    pub pre_close: NaiveTime,
    pub regular_open: NaiveTime,
    pub regular_close: NaiveTime,
    pub post_open: NaiveTime,
    pub post_close: NaiveTime,
}

impl MarketHoursConfig {
    pub fn trades_on_weekday(&self, weekday: chrono::Weekday) -> bool {
        use chrono::Weekday::*;
        let idx = match weekday {
            Sun => 0,
            Mon => 1,
            Tue => 2,
            Wed => 3,
            Thu => 4,
            Fri => 5,
            Sat => 6,
        };
        self.weekday_mask[idx]
    }
}

/// One exchange calendar holiday entry. `is_closed = true` means no trading
/// at all; otherwise the exchange has an early close at `early_close_time`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holiday {
    pub date: chrono::NaiveDate,
    pub exchange_group: ExchangeGroup,
    pub holiday_name: String,
    pub is_closed: bool,
    pub early_close_time: Option<NaiveTime>,
}

/// The record describing one session's hours, holiday status, and
/// early-close status for a single exchange group/date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSession {
    pub date: chrono::NaiveDate,
    pub exchange_group: ExchangeGroup,
    pub asset_class: AssetClass,
    pub timezone: Tz,
    pub is_trading_day: bool,
    pub is_holiday: bool,
    pub is_early_close: bool,
    pub holiday_name: Option<String>,
    pub regular_open: Option<NaiveTime>,
    pub regular_close: Option<NaiveTime>,
    pub pre_open: Option<NaiveTime>,
    pub pre_close: Option<NaiveTime>,
    pub post_open: Option<NaiveTime>,
    pub post_close: Option<NaiveTime>,
}

impl TradingSession {
    /// A non-trading placeholder session (unknown exchange/asset, weekend,
    /// or full holiday).
    pub fn closed(date: chrono::NaiveDate, exchange_group: ExchangeGroup, asset_class: AssetClass, timezone: Tz) -> Self {
        Self {
            date,
            exchange_group,
            asset_class,
            timezone,
            is_trading_day: false,
            is_holiday: false,
            is_early_close: false,
            holiday_name: None,
            regular_open: None,
            regular_close: None,
            pre_open: None,
            pre_close: None,
            post_open: None,
            post_close: None,
        }
    }

    /// Convert this session's local-time boundaries into timezone-aware
    /// instants on `self.date`.
    pub fn regular_open_at(&self) -> Option<chrono::DateTime<Tz>> {
        self.regular_open
            .and_then(|t| self.timezone.from_local_datetime(&self.date.and_time(t)).single())
    }

    pub fn regular_close_at(&self) -> Option<chrono::DateTime<Tz>> {
        self.regular_close
            .and_then(|t| self.timezone.from_local_datetime(&self.date.and_time(t)).single())
    }

    pub fn pre_open_at(&self) -> Option<chrono::DateTime<Tz>> {
        self.pre_open
            .and_then(|t| self.timezone.from_local_datetime(&self.date.and_time(t)).single())
    }

    pub fn post_close_at(&self) -> Option<chrono::DateTime<Tz>> {
        self.post_close
            .and_then(|t| self.timezone.from_local_datetime(&self.date.and_time(t)).single())
    }
}

use chrono::TimeZone;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    Pre,
    Regular,
    Post,
    Closed,
}
