//! Fluent frequency methods for [`Event`]
//!
//! Each named operation writes one or more fields of the event's 5-field
//! cron expression (1=minute, 2=hour, 3=day-of-month, 4=month,
//! 5=day-of-week) and returns the event for chaining. Sub-minute cadences
//! set the repeat interval instead; interval restrictions register
//! filter/reject predicates that recompute their window from "now" on
//! every tick.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use chronarc_common::time::CronExpression;
use chronarc_domain::constants::{
    FRIDAY, MONDAY, SATURDAY, SUNDAY, THURSDAY, TUESDAY, WEDNESDAY,
};

use super::error::{SchedulerError, SchedulerResult};
use super::event::{Event, FilterPredicate};

impl Event {
    /// Set the cron expression directly
    ///
    /// The expression is validated eagerly; a malformed one is a
    /// registration-time error.
    pub fn cron(&mut self, expression: &str) -> SchedulerResult<&mut Self> {
        CronExpression::parse(expression)?;
        self.expression = expression.to_string();
        Ok(self)
    }

    /// Set the timezone the expression is evaluated in
    pub fn timezone(&mut self, tz: Tz) -> &mut Self {
        self.timezone = Some(tz);
        self
    }

    // --- sub-minute cadences --------------------------------------------

    /// Schedule the event to run multiple times per minute
    ///
    /// Fails unless `seconds` evenly divides 60.
    pub fn repeat_every(&mut self, seconds: u32) -> SchedulerResult<&mut Self> {
        if seconds == 0 || 60 % seconds != 0 {
            return Err(SchedulerError::InvalidRepeatInterval { seconds });
        }
        self.repeat_seconds = Some(seconds);
        Ok(self.every_minute())
    }

    /// Run every second
    pub fn every_second(&mut self) -> &mut Self {
        self.repeat_unchecked(1)
    }

    /// Run every two seconds
    pub fn every_two_seconds(&mut self) -> &mut Self {
        self.repeat_unchecked(2)
    }

    /// Run every five seconds
    pub fn every_five_seconds(&mut self) -> &mut Self {
        self.repeat_unchecked(5)
    }

    /// Run every ten seconds
    pub fn every_ten_seconds(&mut self) -> &mut Self {
        self.repeat_unchecked(10)
    }

    /// Run every fifteen seconds
    pub fn every_fifteen_seconds(&mut self) -> &mut Self {
        self.repeat_unchecked(15)
    }

    /// Run every twenty seconds
    pub fn every_twenty_seconds(&mut self) -> &mut Self {
        self.repeat_unchecked(20)
    }

    /// Run every thirty seconds
    pub fn every_thirty_seconds(&mut self) -> &mut Self {
        self.repeat_unchecked(30)
    }

    // Named helpers only cover statically valid divisors of 60
    fn repeat_unchecked(&mut self, seconds: u32) -> &mut Self {
        self.repeat_seconds = Some(seconds);
        self.every_minute()
    }

    // --- minute cadences -------------------------------------------------

    /// Run every minute
    pub fn every_minute(&mut self) -> &mut Self {
        self.splice_into_position(1, "*")
    }

    /// Run every two minutes
    pub fn every_two_minutes(&mut self) -> &mut Self {
        self.splice_into_position(1, "*/2")
    }

    /// Run every three minutes
    pub fn every_three_minutes(&mut self) -> &mut Self {
        self.splice_into_position(1, "*/3")
    }

    /// Run every four minutes
    pub fn every_four_minutes(&mut self) -> &mut Self {
        self.splice_into_position(1, "*/4")
    }

    /// Run every five minutes
    pub fn every_five_minutes(&mut self) -> &mut Self {
        self.splice_into_position(1, "*/5")
    }

    /// Run every ten minutes
    pub fn every_ten_minutes(&mut self) -> &mut Self {
        self.splice_into_position(1, "*/10")
    }

    /// Run every fifteen minutes
    pub fn every_fifteen_minutes(&mut self) -> &mut Self {
        self.splice_into_position(1, "*/15")
    }

    /// Run on the hour and the half hour
    pub fn every_thirty_minutes(&mut self) -> &mut Self {
        self.splice_into_position(1, "0,30")
    }

    // --- hour cadences ---------------------------------------------------

    /// Run hourly on the hour
    pub fn hourly(&mut self) -> &mut Self {
        self.splice_into_position(1, "0")
    }

    /// Run hourly at a given minute offset
    pub fn hourly_at(&mut self, offset: u32) -> &mut Self {
        self.splice_into_position(1, &offset.to_string())
    }

    /// Run every two hours
    pub fn every_two_hours(&mut self) -> &mut Self {
        self.splice_into_position(1, "0").splice_into_position(2, "*/2")
    }

    /// Run every three hours
    pub fn every_three_hours(&mut self) -> &mut Self {
        self.splice_into_position(1, "0").splice_into_position(2, "*/3")
    }

    /// Run every four hours
    pub fn every_four_hours(&mut self) -> &mut Self {
        self.splice_into_position(1, "0").splice_into_position(2, "*/4")
    }

    /// Run every six hours
    pub fn every_six_hours(&mut self) -> &mut Self {
        self.splice_into_position(1, "0").splice_into_position(2, "*/6")
    }

    // --- day cadences ----------------------------------------------------

    /// Run daily at midnight
    pub fn daily(&mut self) -> &mut Self {
        self.splice_into_position(1, "0").splice_into_position(2, "0")
    }

    /// Run daily at the given time (`10:00`, `19:30`, ...)
    pub fn daily_at(&mut self, time: &str) -> SchedulerResult<&mut Self> {
        let (hour, minute) = parse_time_of_day(time)?;
        Ok(self
            .splice_into_position(2, &hour.to_string())
            .splice_into_position(1, &minute.to_string()))
    }

    /// Alias for [`Event::daily_at`]
    pub fn at(&mut self, time: &str) -> SchedulerResult<&mut Self> {
        self.daily_at(time)
    }

    /// Run twice daily, on the hour
    pub fn twice_daily(&mut self, first: u32, second: u32) -> &mut Self {
        let hours = format!("{},{}", first, second);
        self.splice_into_position(1, "0").splice_into_position(2, &hours)
    }

    // --- week cadences ---------------------------------------------------

    /// Run only on weekdays
    pub fn weekdays(&mut self) -> &mut Self {
        self.splice_into_position(5, "1-5")
    }

    /// Run only on weekends
    pub fn weekends(&mut self) -> &mut Self {
        self.splice_into_position(5, "0,6")
    }

    /// Run only on Mondays
    pub fn mondays(&mut self) -> &mut Self {
        self.days(&[MONDAY])
    }

    /// Run only on Tuesdays
    pub fn tuesdays(&mut self) -> &mut Self {
        self.days(&[TUESDAY])
    }

    /// Run only on Wednesdays
    pub fn wednesdays(&mut self) -> &mut Self {
        self.days(&[WEDNESDAY])
    }

    /// Run only on Thursdays
    pub fn thursdays(&mut self) -> &mut Self {
        self.days(&[THURSDAY])
    }

    /// Run only on Fridays
    pub fn fridays(&mut self) -> &mut Self {
        self.days(&[FRIDAY])
    }

    /// Run only on Saturdays
    pub fn saturdays(&mut self) -> &mut Self {
        self.days(&[SATURDAY])
    }

    /// Run only on Sundays
    pub fn sundays(&mut self) -> &mut Self {
        self.days(&[SUNDAY])
    }

    /// Run weekly, Sunday at midnight
    pub fn weekly(&mut self) -> &mut Self {
        self.splice_into_position(1, "0")
            .splice_into_position(2, "0")
            .splice_into_position(5, "0")
    }

    /// Run weekly on the given day and time
    pub fn weekly_on(&mut self, day: u32, time: &str) -> SchedulerResult<&mut Self> {
        self.daily_at(time)?;
        Ok(self.splice_into_position(5, &day.to_string()))
    }

    /// Set the days of the week the event should run on
    pub fn days(&mut self, days: &[u32]) -> &mut Self {
        let joined = days.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
        self.splice_into_position(5, &joined)
    }

    // --- month and year cadences ----------------------------------------

    /// Run monthly on the first day at midnight
    pub fn monthly(&mut self) -> &mut Self {
        self.splice_into_position(1, "0")
            .splice_into_position(2, "0")
            .splice_into_position(3, "1")
    }

    /// Run monthly on the given day and time
    pub fn monthly_on(&mut self, day: u32, time: &str) -> SchedulerResult<&mut Self> {
        self.daily_at(time)?;
        Ok(self.splice_into_position(3, &day.to_string()))
    }

    /// Run twice monthly, at midnight on the given days
    pub fn twice_monthly(&mut self, first: u32, second: u32) -> &mut Self {
        let days = format!("{},{}", first, second);
        self.splice_into_position(1, "0")
            .splice_into_position(2, "0")
            .splice_into_position(3, &days)
    }

    /// Run on the last day of the current month at the given time
    ///
    /// The month boundary is resolved at registration time.
    pub fn last_day_of_month(&mut self, time: &str) -> SchedulerResult<&mut Self> {
        self.daily_at(time)?;
        let now = Utc::now();
        let last_day = days_in_month(now.year(), now.month());
        Ok(self.splice_into_position(3, &last_day.to_string()))
    }

    /// Run quarterly on the first day at midnight
    pub fn quarterly(&mut self) -> &mut Self {
        self.splice_into_position(1, "0")
            .splice_into_position(2, "0")
            .splice_into_position(3, "1")
            .splice_into_position(4, "1-12/3")
    }

    /// Run yearly on January 1st at midnight
    pub fn yearly(&mut self) -> &mut Self {
        self.splice_into_position(1, "0")
            .splice_into_position(2, "0")
            .splice_into_position(3, "1")
            .splice_into_position(4, "1")
    }

    /// Run yearly on the given month, day, and time
    pub fn yearly_on(&mut self, month: u32, day: u32, time: &str) -> SchedulerResult<&mut Self> {
        self.daily_at(time)?;
        Ok(self
            .splice_into_position(3, &day.to_string())
            .splice_into_position(4, &month.to_string()))
    }

    // --- interval restriction -------------------------------------------

    /// Only run between the two times of day (inclusive)
    ///
    /// The window is recomputed from "now" on every evaluation; a window
    /// whose end precedes its start crosses midnight.
    pub fn between(&mut self, start: &str, end: &str) -> SchedulerResult<&mut Self> {
        let predicate = self.in_time_interval(start, end)?;
        self.filters.push(predicate);
        Ok(self)
    }

    /// Do not run between the two times of day (inclusive)
    pub fn unless_between(&mut self, start: &str, end: &str) -> SchedulerResult<&mut Self> {
        let predicate = self.in_time_interval(start, end)?;
        self.rejects.push(predicate);
        Ok(self)
    }

    fn in_time_interval(&self, start: &str, end: &str) -> SchedulerResult<FilterPredicate> {
        let start = parse_naive_time(start)?;
        let end = parse_naive_time(end)?;
        let timezone = self.timezone;
        Ok(Arc::new(move |now: DateTime<Utc>| match timezone {
            Some(tz) => time_window_contains(now.with_timezone(&tz).naive_local(), start, end),
            None => time_window_contains(now.naive_utc(), start, end),
        }))
    }

    /// Splice the given value into the given 1-indexed field position
    fn splice_into_position(&mut self, position: usize, value: &str) -> &mut Self {
        let mut segments: Vec<String> =
            self.expression.split_whitespace().map(String::from).collect();
        segments[position - 1] = value.to_string();
        self.expression = segments.join(" ");
        self
    }
}

/// Inclusive time-of-day window check with day-wrap handling
///
/// When the end precedes the start the window crosses midnight: a start
/// still ahead of "now" is pulled into the previous day, otherwise the end
/// is pushed into the next day.
pub(crate) fn time_window_contains(now: NaiveDateTime, start: NaiveTime, end: NaiveTime) -> bool {
    let mut start_dt = now.date().and_time(start);
    let mut end_dt = now.date().and_time(end);

    if end_dt < start_dt {
        if start_dt > now {
            start_dt -= Duration::days(1);
        } else {
            end_dt += Duration::days(1);
        }
    }

    start_dt <= now && now <= end_dt
}

fn parse_time_of_day(time: &str) -> SchedulerResult<(u32, u32)> {
    let mut segments = time.split(':');
    let hour = segments
        .next()
        .and_then(|h| h.parse::<u32>().ok())
        .filter(|h| *h < 24)
        .ok_or_else(|| SchedulerError::InvalidTimeOfDay(time.to_string()))?;
    let minute = match segments.next() {
        Some(m) => m
            .parse::<u32>()
            .ok()
            .filter(|m| *m < 60)
            .ok_or_else(|| SchedulerError::InvalidTimeOfDay(time.to_string()))?,
        None => 0,
    };
    if segments.next().is_some() {
        return Err(SchedulerError::InvalidTimeOfDay(time.to_string()));
    }
    Ok((hour, minute))
}

fn parse_naive_time(time: &str) -> SchedulerResult<NaiveTime> {
    let (hour, minute) = parse_time_of_day(time)?;
    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| SchedulerError::InvalidTimeOfDay(time.to_string()))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::scheduling::ports::EventMutex;

    struct NullEventMutex;

    #[async_trait]
    impl EventMutex for NullEventMutex {
        async fn create(&self, _event: &Event) -> SchedulerResult<bool> {
            Ok(true)
        }

        async fn exists(&self, _event: &Event) -> SchedulerResult<bool> {
            Ok(false)
        }

        async fn forget(&self, _event: &Event) -> SchedulerResult<()> {
            Ok(())
        }
    }

    fn event() -> Event {
        Event::new_shell(Arc::new(NullEventMutex), "echo hi", None)
    }

    #[test]
    fn default_expression_is_every_minute() {
        assert_eq!(event().expression(), "* * * * *");
    }

    #[test]
    fn builder_operations_write_expected_expressions() {
        let cases: Vec<(&str, Box<dyn Fn(&mut Event)>)> = vec![
            ("* * * * *", Box::new(|e| {
                e.every_minute();
            })),
            ("*/2 * * * *", Box::new(|e| {
                e.every_two_minutes();
            })),
            ("*/5 * * * *", Box::new(|e| {
                e.every_five_minutes();
            })),
            ("0,30 * * * *", Box::new(|e| {
                e.every_thirty_minutes();
            })),
            ("0 * * * *", Box::new(|e| {
                e.hourly();
            })),
            ("17 * * * *", Box::new(|e| {
                e.hourly_at(17);
            })),
            ("0 */6 * * *", Box::new(|e| {
                e.every_six_hours();
            })),
            ("0 0 * * *", Box::new(|e| {
                e.daily();
            })),
            ("30 10 * * *", Box::new(|e| {
                e.daily_at("10:30").unwrap();
            })),
            ("0 10 * * *", Box::new(|e| {
                e.daily_at("10").unwrap();
            })),
            ("0 1,13 * * *", Box::new(|e| {
                e.twice_daily(1, 13);
            })),
            ("* * * * 1-5", Box::new(|e| {
                e.weekdays();
            })),
            ("* * * * 0,6", Box::new(|e| {
                e.weekends();
            })),
            ("* * * * 3", Box::new(|e| {
                e.wednesdays();
            })),
            ("0 0 * * 0", Box::new(|e| {
                e.weekly();
            })),
            ("0 8 * * 1", Box::new(|e| {
                e.weekly_on(1, "8:00").unwrap();
            })),
            ("* * * * 1,3,5", Box::new(|e| {
                e.days(&[1, 3, 5]);
            })),
            ("0 0 1 * *", Box::new(|e| {
                e.monthly();
            })),
            ("0 15 4 * *", Box::new(|e| {
                e.monthly_on(4, "15:00").unwrap();
            })),
            ("0 0 1,16 * *", Box::new(|e| {
                e.twice_monthly(1, 16);
            })),
            ("0 0 1 1-12/3 *", Box::new(|e| {
                e.quarterly();
            })),
            ("0 0 1 1 *", Box::new(|e| {
                e.yearly();
            })),
            ("30 9 15 6 *", Box::new(|e| {
                e.yearly_on(6, 15, "9:30").unwrap();
            })),
        ];

        for (expected, configure) in cases {
            let mut event = event();
            configure(&mut event);
            assert_eq!(event.expression(), expected);
            // Every operation leaves exactly five whitespace-separated fields
            assert_eq!(event.expression().split_whitespace().count(), 5);
        }
    }

    #[test]
    fn chained_operations_compose() {
        let mut event = event();
        event.daily_at("06:15").unwrap().weekdays();
        assert_eq!(event.expression(), "15 6 * * 1-5");
    }

    #[test]
    fn cron_validates_eagerly() {
        let mut event = event();
        assert!(event.cron("0 10,20 * * *").is_ok());
        assert_eq!(event.expression(), "0 10,20 * * *");
        assert!(event.cron("not a cron").is_err());
        assert!(event.cron("* * * *").is_err());
        // A rejected expression leaves the previous one in place
        assert_eq!(event.expression(), "0 10,20 * * *");
    }

    #[test]
    fn repeat_every_rejects_non_divisors_of_sixty() {
        for seconds in [7, 11, 13, 25, 45, 61, 0] {
            let mut event = event();
            assert!(
                matches!(
                    event.repeat_every(seconds),
                    Err(SchedulerError::InvalidRepeatInterval { .. })
                ),
                "{} should be rejected",
                seconds
            );
        }
        for seconds in [1, 2, 3, 4, 5, 6, 10, 12, 15, 20, 30, 60] {
            let mut event = event();
            assert!(event.repeat_every(seconds).is_ok(), "{} should be accepted", seconds);
            assert_eq!(event.repeat_seconds(), Some(seconds));
            assert_eq!(event.expression(), "* * * * *");
        }
    }

    #[test]
    fn sub_minute_helpers_set_interval_and_minute_expression() {
        let mut event = event();
        event.daily();
        event.every_thirty_seconds();
        assert_eq!(event.repeat_seconds(), Some(30));
        assert_eq!(event.expression(), "* 0 * * *");
        assert!(event.is_repeatable());
    }

    #[test]
    fn invalid_times_of_day_are_rejected() {
        let mut event = event();
        assert!(matches!(event.daily_at("24:00"), Err(SchedulerError::InvalidTimeOfDay(_))));
        assert!(matches!(event.daily_at("10:60"), Err(SchedulerError::InvalidTimeOfDay(_))));
        assert!(matches!(event.daily_at("abc"), Err(SchedulerError::InvalidTimeOfDay(_))));
        assert!(matches!(event.between("23:00", "oops"), Err(SchedulerError::InvalidTimeOfDay(_))));
    }

    #[test]
    fn time_window_handles_same_day_intervals() {
        let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(17, 0, 0).unwrap();

        let inside = Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap().naive_utc();
        let before = Utc.with_ymd_and_hms(2024, 5, 6, 8, 59, 0).unwrap().naive_utc();
        let edge = Utc.with_ymd_and_hms(2024, 5, 6, 17, 0, 0).unwrap().naive_utc();

        assert!(time_window_contains(inside, start, end));
        assert!(!time_window_contains(before, start, end));
        assert!(time_window_contains(edge, start, end));
    }

    #[test]
    fn time_window_wraps_across_midnight() {
        let start = NaiveTime::from_hms_opt(23, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(1, 0, 0).unwrap();

        let just_after_midnight = Utc.with_ymd_and_hms(2024, 5, 6, 0, 30, 0).unwrap().naive_utc();
        let late_evening = Utc.with_ymd_and_hms(2024, 5, 6, 23, 30, 0).unwrap().naive_utc();
        let midday = Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap().naive_utc();

        assert!(time_window_contains(just_after_midnight, start, end));
        assert!(time_window_contains(late_evening, start, end));
        assert!(!time_window_contains(midday, start, end));
    }

    #[tokio::test]
    async fn between_registers_a_live_filter() {
        let mut event = event();
        event.between("23:00", "01:00").unwrap();

        let in_window = Utc.with_ymd_and_hms(2024, 5, 6, 0, 30, 0).unwrap();
        let out_of_window = Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap();

        assert!(event.filters_pass(in_window).await.unwrap());
        assert!(!event.filters_pass(out_of_window).await.unwrap());
    }

    #[tokio::test]
    async fn unless_between_registers_a_live_reject() {
        let mut event = event();
        event.unless_between("09:00", "17:00").unwrap();

        let in_window = Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap();
        let out_of_window = Utc.with_ymd_and_hms(2024, 5, 6, 20, 0, 0).unwrap();

        assert!(!event.filters_pass(in_window).await.unwrap());
        assert!(event.filters_pass(out_of_window).await.unwrap());
    }

    #[tokio::test]
    async fn between_evaluates_in_the_event_timezone() {
        let mut event = event();
        let tz: Tz = "America/New_York".parse().unwrap();
        event.timezone(tz).between("09:00", "17:00").unwrap();

        // 14:30 UTC == 09:30 New York (EST): inside the window locally,
        // outside it in UTC terms
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap();
        assert!(event.filters_pass(now).await.unwrap());

        let now = Utc.with_ymd_and_hms(2024, 1, 15, 3, 0, 0).unwrap();
        assert!(!event.filters_pass(now).await.unwrap());
    }
}
