pub mod cache;
pub mod service;
pub mod types;

pub use cache::{CacheStats, SessionCache};
pub use service::{BacktestTimeInput, TimeMode, TimeService};
pub use types::{AssetClass, ExchangeGroup, Holiday, MarketHoursConfig, SessionType, TradingSession};

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use chrono_tz::America::New_York;

    use super::*;

    fn nyse_hours() -> MarketHoursConfig {
        MarketHoursConfig {
            exchange_group: "US_EQUITY".into(),
            asset_class: "EQUITY".into(),
            timezone: New_York,
            weekday_mask: [false, true, true, true, true, true, false],
            pre_open: NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            pre_close: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            regular_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            regular_close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            post_open: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            post_close: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        }
    }

    fn thanksgiving_2024() -> Holiday {
        Holiday {
            date: NaiveDate::from_ymd_opt(2024, 11, 28).unwrap(),
            exchange_group: "US_EQUITY".into(),
            holiday_name: "Thanksgiving".into(),
            is_closed: true,
            early_close_time: None,
        }
    }

    fn day_after_thanksgiving_early_close() -> Holiday {
        Holiday {
            date: NaiveDate::from_ymd_opt(2024, 11, 29).unwrap(),
            exchange_group: "US_EQUITY".into(),
            holiday_name: "Day after Thanksgiving (early close)".into(),
            is_closed: false,
            early_close_time: Some(NaiveTime::from_hms_opt(13, 0, 0).unwrap()),
        }
    }

    fn service() -> TimeService {
        TimeService::new(
            TimeMode::Backtest,
            New_York,
            vec![nyse_hours()],
            vec![thanksgiving_2024(), day_after_thanksgiving_early_close()],
            "US_EQUITY",
            "EQUITY",
            NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
        )
    }

    #[test]
    fn thanksgiving_is_closed_and_next_trading_date_skips_it() {
        let svc = service();
        let thanksgiving = NaiveDate::from_ymd_opt(2024, 11, 28).unwrap();
        let session = svc.trading_session(thanksgiving, "US_EQUITY", "EQUITY");
        assert!(!session.is_trading_day);
        assert!(session.is_holiday);

        let next = svc.next_trading_date(thanksgiving, 1).unwrap();
        assert_eq!(next, NaiveDate::from_ymd_opt(2024, 11, 29).unwrap());
    }

    #[test]
    fn day_after_thanksgiving_is_early_close_not_holiday() {
        let svc = service();
        let date = NaiveDate::from_ymd_opt(2024, 11, 29).unwrap();
        let session = svc.trading_session(date, "US_EQUITY", "EQUITY");
        assert!(session.is_trading_day);
        assert!(!session.is_holiday);
        assert!(session.is_early_close);
        assert_eq!(session.regular_close, Some(NaiveTime::from_hms_opt(13, 0, 0).unwrap()));
        assert!(session.post_open.is_none());
    }

    #[test]
    fn counts_november_2024_trading_days() {
        let svc = service();
        let count = svc
            .count_trading_days(
                NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 11, 30).unwrap(),
            )
            .unwrap();
        assert_eq!(count, 20);
    }

    #[test]
    fn weekend_is_closed() {
        let svc = service();
        let saturday = NaiveDate::from_ymd_opt(2024, 11, 2).unwrap();
        let session = svc.trading_session(saturday, "US_EQUITY", "EQUITY");
        assert!(!session.is_trading_day);
        assert!(!session.is_holiday);
    }

    #[test]
    fn unknown_exchange_is_closed_not_an_error() {
        let svc = service();
        let session = svc.trading_session(NaiveDate::from_ymd_opt(2024, 11, 4).unwrap(), "TSE", "EQUITY");
        assert!(!session.is_trading_day);
    }

    #[test]
    fn cache_hits_on_repeated_query() {
        let svc = service();
        let date = NaiveDate::from_ymd_opt(2024, 11, 4).unwrap();
        svc.trading_session(date, "US_EQUITY", "EQUITY");
        svc.trading_session(date, "US_EQUITY", "EQUITY");
        let stats = svc.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn backtest_clock_auto_initializes_at_regular_open() {
        let svc = service();
        let now = svc.current_time(Some(New_York));
        assert_eq!(now.date_naive(), NaiveDate::from_ymd_opt(2024, 11, 1).unwrap());
        assert_eq!(now.time(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
    }

    #[test]
    fn live_mode_rejects_set_backtest_time() {
        let svc = TimeService::new(
            TimeMode::Live,
            New_York,
            vec![nyse_hours()],
            vec![],
            "US_EQUITY",
            "EQUITY",
            NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
        );
        let result = svc.set_backtest_time(BacktestTimeInput::Aware(chrono::Utc::now()));
        assert!(result.is_err());
    }
}
