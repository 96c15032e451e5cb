#[cfg(test)]
mod cron_utils_tests {
    use broker_dispatcher::cron_utils::*;

    use chrono::{TimeZone, Utc};

    #[test]
    fn test_cron_scheduler_creation() {
        assert!(CronScheduler::new("0 0 12 * * ?").is_ok());
        assert!(CronScheduler::new("0 0 0 * * *").is_ok());
        assert!(CronScheduler::new("invalid").is_err());
        assert!(CronScheduler::new("").is_err());
    }

    #[test]
    fn test_is_valid() {
        assert!(CronScheduler::is_valid(""));
        assert!(CronScheduler::is_valid("   "));
        assert!(CronScheduler::is_valid("0 0 12 * * ?"));
        assert!(CronScheduler::is_valid("0 */5 * * * *"));
        assert!(CronScheduler::is_valid("0 0 9-17 * * MON-FRI"));
        assert!(!CronScheduler::is_valid("invalid"));
        assert!(!CronScheduler::is_valid("0 0 0 32 * *"));
        assert!(!CronScheduler::is_valid("99 * * * * *"));
    }

    #[test]
    fn test_validate_cron_expression_requires_value() {
        assert!(CronScheduler::validate_cron_expression("0 0 18 * * ?").is_ok());
        let err = CronScheduler::validate_cron_expression("").unwrap_err();
        assert!(err.is_configuration());
        assert!(CronScheduler::validate_cron_expression("not a cron").is_err());
    }

    #[test]
    fn test_next_execution_time_in_utc() {
        let scheduler = CronScheduler::new("0 0 12 * * ?").unwrap();

        let before_noon = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let next = scheduler.next_execution_time(before_noon).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());

        let after_noon = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let next = scheduler.next_execution_time(after_noon).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap());
    }
}
