use std::collections::HashMap;

use analysis_core::AnalysisError;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;

use crate::cache::{CacheStats, SessionCache};
use crate::types::{AssetClass, ExchangeGroup, Holiday, MarketHoursConfig, SessionType, TradingSession};

/// Bound on the day-at-a-time scans used by trading-date navigation, per
/// spec §4.1. A calendar with no trading days for over a year indicates
/// malformed configuration, not a slow-but-valid query.
const MAX_SCAN_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMode {
    Live,
    Backtest,
}

/// Input to `set_backtest_time`: either a naive timestamp (interpreted in
/// the default exchange's local timezone) or an already timezone-aware one.
pub enum BacktestTimeInput {
    Naive(NaiveDateTime),
    Aware(DateTime<Utc>),
}

struct Calendar {
    hours: HashMap<(ExchangeGroup, AssetClass), MarketHoursConfig>,
    holidays: HashMap<ExchangeGroup, Vec<Holiday>>,
}

impl Calendar {
    fn hours_for(&self, exchange_group: &str, asset_class: &str) -> Option<&MarketHoursConfig> {
        self.hours.get(&(exchange_group.to_string(), asset_class.to_string()))
    }

    fn holiday_for(&self, exchange_group: &str, date: NaiveDate) -> Option<&Holiday> {
        self.holidays
            .get(exchange_group)
            .and_then(|hs| hs.iter().find(|h| h.date == date))
    }
}

/// Single source of truth for time: live wall clock or backtest simulated
/// clock, trading sessions, calendar arithmetic, and timezone conversion
/// (spec §4.1). Constructed once by the composition root and shared by
/// `Arc` (Design Notes §9 — no global/module-level singleton).
pub struct TimeService {
    mode: TimeMode,
    live_timezone: Tz,
    calendar: Calendar,
    default_exchange_group: ExchangeGroup,
    default_asset_class: AssetClass,
    backtest_start_date: NaiveDate,
    backtest_clock: Mutex<Option<DateTime<Utc>>>,
    cache: SessionCache,
}

impl TimeService {
    pub fn new(
        mode: TimeMode,
        live_timezone: Tz,
        market_hours: Vec<MarketHoursConfig>,
        holidays: Vec<Holiday>,
        default_exchange_group: impl Into<String>,
        default_asset_class: impl Into<String>,
        backtest_start_date: NaiveDate,
    ) -> Self {
        let mut hours = HashMap::new();
        for cfg in market_hours {
            hours.insert((cfg.exchange_group.clone(), cfg.asset_class.clone()), cfg);
        }
        let mut by_group: HashMap<ExchangeGroup, Vec<Holiday>> = HashMap::new();
        for h in holidays {
            by_group.entry(h.exchange_group.clone()).or_default().push(h);
        }
        Self {
            mode,
            live_timezone,
            calendar: Calendar { hours, holidays: by_group },
            default_exchange_group: default_exchange_group.into(),
            default_asset_class: default_asset_class.into(),
            backtest_start_date,
            backtest_clock: Mutex::new(None),
            cache: SessionCache::new(),
        }
    }

    pub fn mode(&self) -> TimeMode {
        self.mode
    }

    fn require_backtest(&self, op: &str) -> Result<(), AnalysisError> {
        if self.mode != TimeMode::Backtest {
            return Err(AnalysisError::ModeMismatch(format!(
                "{op} is only valid in backtest mode"
            )));
        }
        Ok(())
    }

    /// Current time in `tz` (defaults to the live/default exchange
    /// timezone). In backtest mode, the first access auto-initializes the
    /// simulated clock from the session's start date at that date's regular
    /// market open.
    pub fn current_time(&self, tz: Option<Tz>) -> DateTime<Tz> {
        let target = tz.unwrap_or(self.live_timezone);
        match self.mode {
            TimeMode::Live => Utc::now().with_timezone(&target),
            TimeMode::Backtest => {
                let mut clock = self.backtest_clock.lock();
                if clock.is_none() {
                    let session = self.trading_session(
                        self.backtest_start_date,
                        &self.default_exchange_group,
                        &self.default_asset_class,
                    );
                    let open = session
                        .regular_open_at()
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|| {
                            Utc.from_utc_datetime(&self.backtest_start_date.and_hms_opt(0, 0, 0).unwrap())
                        });
                    *clock = Some(open);
                }
                clock.unwrap().with_timezone(&target)
            }
        }
    }

    pub fn set_backtest_time(&self, t: BacktestTimeInput) -> Result<(), AnalysisError> {
        self.require_backtest("set_backtest_time")?;
        let utc = match t {
            BacktestTimeInput::Aware(dt) => dt,
            BacktestTimeInput::Naive(naive) => {
                let tz = self.market_timezone(&self.default_exchange_group)?;
                tz.from_local_datetime(&naive)
                    .single()
                    .ok_or_else(|| AnalysisError::InvalidData("ambiguous local time".into()))?
                    .with_timezone(&Utc)
            }
        };
        *self.backtest_clock.lock() = Some(utc);
        Ok(())
    }

    pub fn market_timezone(&self, exchange_group: &str) -> Result<Tz, AnalysisError> {
        self.calendar
            .hours
            .iter()
            .find(|((g, _), _)| g == exchange_group)
            .map(|(_, cfg)| cfg.timezone)
            .ok_or_else(|| AnalysisError::Configuration(format!("unknown exchange group: {exchange_group}")))
    }

    pub fn to_utc(&self, t: DateTime<Tz>) -> DateTime<Utc> {
        t.with_timezone(&Utc)
    }

    pub fn convert_timezone(&self, t: DateTime<Utc>, to_tz: Tz) -> DateTime<Tz> {
        t.with_timezone(&to_tz)
    }

    /// Combines the weekday mask, holiday table, and `MarketHoursConfig`
    /// into a `TradingSession`. Unknown exchange/asset class returns a
    /// closed session rather than erroring (spec §4.1 failure model).
    pub fn trading_session(&self, date: NaiveDate, exchange_group: &str, asset_class: &str) -> TradingSession {
        let Some(cfg) = self.calendar.hours_for(exchange_group, asset_class) else {
            tracing::warn!(exchange_group, asset_class, "no market hours configured, treating as closed");
            return TradingSession::closed(date, exchange_group.into(), asset_class.into(), self.live_timezone);
        };
        self.cache.get_or_compute(date, exchange_group, asset_class, || {
            self.compute_session(date, cfg)
        })
    }

    fn compute_session(&self, date: NaiveDate, cfg: &MarketHoursConfig) -> TradingSession {
        if let Some(holiday) = self.calendar.holiday_for(&cfg.exchange_group, date) {
            if holiday.is_closed {
                return TradingSession {
                    date,
                    exchange_group: cfg.exchange_group.clone(),
                    asset_class: cfg.asset_class.clone(),
                    timezone: cfg.timezone,
                    is_trading_day: false,
                    is_holiday: true,
                    is_early_close: false,
                    holiday_name: Some(holiday.holiday_name.clone()),
                    regular_open: None,
                    regular_close: None,
                    pre_open: None,
                    pre_close: None,
                    post_open: None,
                    post_close: None,
                };
            }
            // Early close: a trading day, not a holiday.
            return TradingSession {
                date,
                exchange_group: cfg.exchange_group.clone(),
                asset_class: cfg.asset_class.clone(),
                timezone: cfg.timezone,
                is_trading_day: true,
                is_holiday: false,
                is_early_close: true,
                holiday_name: Some(holiday.holiday_name.clone()),
                regular_open: Some(cfg.regular_open),
                regular_close: holiday.early_close_time.or(Some(cfg.regular_close)),
                pre_open: Some(cfg.pre_open),
                pre_close: Some(cfg.pre_close),
                post_open: None,
                post_close: None,
            };
        }

        if !cfg.trades_on_weekday(date.weekday()) {
            return TradingSession::closed(date, cfg.exchange_group.clone(), cfg.asset_class.clone(), cfg.timezone);
        }

        TradingSession {
            date,
            exchange_group: cfg.exchange_group.clone(),
            asset_class: cfg.asset_class.clone(),
            timezone: cfg.timezone,
            is_trading_day: true,
            is_holiday: false,
            is_early_close: false,
            holiday_name: None,
            regular_open: Some(cfg.regular_open),
            regular_close: Some(cfg.regular_close),
            pre_open: Some(cfg.pre_open),
            pre_close: Some(cfg.pre_close),
            post_open: Some(cfg.post_open),
            post_close: Some(cfg.post_close),
        }
    }

    pub fn is_market_open(&self, ts: DateTime<Utc>, include_extended: bool) -> bool {
        !matches!(self.session_type_for(ts, &self.default_exchange_group, &self.default_asset_class), SessionType::Closed)
            && (include_extended || self.session_type_for(ts, &self.default_exchange_group, &self.default_asset_class) == SessionType::Regular)
    }

    pub fn session_type(&self, ts: DateTime<Utc>) -> SessionType {
        self.session_type_for(ts, &self.default_exchange_group, &self.default_asset_class)
    }

    fn session_type_for(&self, ts: DateTime<Utc>, exchange_group: &str, asset_class: &str) -> SessionType {
        let tz = match self.market_timezone(exchange_group) {
            Ok(tz) => tz,
            Err(_) => return SessionType::Closed,
        };
        let local = ts.with_timezone(&tz);
        let session = self.trading_session(local.date_naive(), exchange_group, asset_class);
        if !session.is_trading_day {
            return SessionType::Closed;
        }
        let (Some(pre_open), Some(reg_open), Some(reg_close)) =
            (session.pre_open_at(), session.regular_open_at(), session.regular_close_at())
        else {
            return SessionType::Closed;
        };
        if local < pre_open {
            return SessionType::Closed;
        }
        if local < reg_open {
            return SessionType::Pre;
        }
        if local < reg_close {
            return SessionType::Regular;
        }
        if let Some(post_close) = session.post_close_at() {
            if local < post_close {
                return SessionType::Post;
            }
        }
        SessionType::Closed
    }

    fn is_trading_date(&self, date: NaiveDate) -> bool {
        self.trading_session(date, &self.default_exchange_group, &self.default_asset_class)
            .is_trading_day
    }

    pub fn next_trading_date(&self, from: NaiveDate, n: u32) -> Result<NaiveDate, AnalysisError> {
        if n == 0 {
            return Err(AnalysisError::InvalidData("n must be positive".into()));
        }
        let mut date = from;
        let mut remaining = n;
        let mut scanned = 0i64;
        while remaining > 0 {
            date = date.succ_opt().ok_or_else(|| AnalysisError::InvariantViolation("date overflow".into()))?;
            scanned += 1;
            if scanned > MAX_SCAN_DAYS {
                return Err(AnalysisError::InvariantViolation(format!(
                    "no trading day found within {MAX_SCAN_DAYS} days of {from}"
                )));
            }
            if self.is_trading_date(date) {
                remaining -= 1;
            }
        }
        Ok(date)
    }

    pub fn previous_trading_date(&self, from: NaiveDate, n: u32) -> Result<NaiveDate, AnalysisError> {
        if n == 0 {
            return Err(AnalysisError::InvalidData("n must be positive".into()));
        }
        let mut date = from;
        let mut remaining = n;
        let mut scanned = 0i64;
        while remaining > 0 {
            date = date.pred_opt().ok_or_else(|| AnalysisError::InvariantViolation("date underflow".into()))?;
            scanned += 1;
            if scanned > MAX_SCAN_DAYS {
                return Err(AnalysisError::InvariantViolation(format!(
                    "no trading day found within {MAX_SCAN_DAYS} days before {from}"
                )));
            }
            if self.is_trading_date(date) {
                remaining -= 1;
            }
        }
        Ok(date)
    }

    pub fn count_trading_days(&self, a: NaiveDate, b: NaiveDate) -> Result<u32, AnalysisError> {
        if a > b {
            return Err(AnalysisError::InvalidData(format!("count_trading_days: {a} > {b}")));
        }
        let span = (b - a).num_days();
        if span > MAX_SCAN_DAYS {
            return Err(AnalysisError::InvariantViolation(format!(
                "range {a}..{b} exceeds the {MAX_SCAN_DAYS}-day scan bound"
            )));
        }
        let mut count = 0u32;
        let mut date = a;
        loop {
            if self.is_trading_date(date) {
                count += 1;
            }
            if date == b {
                break;
            }
            date = date.succ_opt().unwrap();
        }
        Ok(count)
    }

    pub fn first_trading_date_inclusive(&self, from: NaiveDate) -> Result<NaiveDate, AnalysisError> {
        let mut date = from;
        let mut scanned = 0i64;
        loop {
            if self.is_trading_date(date) {
                return Ok(date);
            }
            date = date.succ_opt().ok_or_else(|| AnalysisError::InvariantViolation("date overflow".into()))?;
            scanned += 1;
            if scanned > MAX_SCAN_DAYS {
                return Err(AnalysisError::InvariantViolation(format!(
                    "no trading day found within {MAX_SCAN_DAYS} days of {from}"
                )));
            }
        }
    }

    pub fn trading_dates_in_range(&self, a: NaiveDate, b: NaiveDate) -> Result<Vec<NaiveDate>, AnalysisError> {
        if a > b {
            return Err(AnalysisError::InvalidData(format!("trading_dates_in_range: {a} > {b}")));
        }
        let span = (b - a).num_days();
        if span > MAX_SCAN_DAYS {
            return Err(AnalysisError::InvariantViolation(format!(
                "range {a}..{b} exceeds the {MAX_SCAN_DAYS}-day scan bound"
            )));
        }
        let mut out = Vec::new();
        let mut date = a;
        loop {
            if self.is_trading_date(date) {
                out.push(date);
            }
            if date == b {
                break;
            }
            date = date.succ_opt().unwrap();
        }
        Ok(out)
    }

    /// Moves the simulated clock to the next trading day's open (or
    /// pre-open) in exchange timezone, skipping weekends and holidays.
    /// Backtest-only.
    pub fn advance_to_market_open(&self, include_extended: bool) -> Result<DateTime<Utc>, AnalysisError> {
        self.require_backtest("advance_to_market_open")?;
        let tz = self.market_timezone(&self.default_exchange_group)?;
        let current_local = self.current_time(Some(tz));
        let next_date = self.next_trading_date(current_local.date_naive(), 1)?;
        let session = self.trading_session(next_date, &self.default_exchange_group, &self.default_asset_class);
        let open = if include_extended {
            session.pre_open_at().or_else(|| session.regular_open_at())
        } else {
            session.regular_open_at()
        }
        .ok_or_else(|| AnalysisError::InvariantViolation(format!("{next_date} has no open configured")))?;
        let utc = open.with_timezone(&Utc);
        *self.backtest_clock.lock() = Some(utc);
        Ok(utc)
    }

    pub fn invalidate_cache(&self) {
        self.cache.invalidate();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
