//! Cron expression parsing and evaluation
//!
//! Implements the standard 5-field cron format (minute, hour, day-of-month,
//! month, day-of-week) with `*`, single values, lists, ranges, and step
//! expressions. Matching is minute-granular and timezone-agnostic: callers
//! convert "now" into whatever zone the expression should be evaluated in
//! before asking.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike};
use thiserror::Error;

/// Error type for cron parsing
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CronParseError {
    #[error("Invalid cron expression: {0}")]
    InvalidExpression(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Expected 5 fields, got {0}")]
    WrongFieldCount(usize),
}

/// A parsed 5-field cron expression
///
/// # Examples
///
/// ```
/// use chronarc_common::time::CronExpression;
///
/// // Every day at midnight
/// let cron = CronExpression::parse("0 0 * * *").unwrap();
///
/// // Twice a day, on the hour
/// let cron = CronExpression::parse("0 10,20 * * *").unwrap();
///
/// // Every five minutes on weekdays
/// let cron = CronExpression::parse("*/5 * * * 1-5").unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    minute: CronField,
    hour: CronField,
    day: CronField,
    month: CronField,
    weekday: CronField,
}

impl CronExpression {
    /// Parse a cron expression from a string
    pub fn parse(expr: &str) -> Result<Self, CronParseError> {
        let parts: Vec<&str> = expr.split_whitespace().collect();

        if parts.len() != 5 {
            return Err(CronParseError::WrongFieldCount(parts.len()));
        }

        Ok(Self {
            minute: CronField::parse(parts[0], 0, 59)?,
            hour: CronField::parse(parts[1], 0, 23)?,
            day: CronField::parse(parts[2], 1, 31)?,
            month: CronField::parse(parts[3], 1, 12)?,
            weekday: CronField::parse(parts[4], 0, 7)?,
        })
    }

    /// Check if a datetime matches this expression, to minute granularity
    ///
    /// The datetime's zone is the zone the expression is evaluated in.
    pub fn matches<Tz: TimeZone>(&self, dt: &DateTime<Tz>) -> bool {
        self.minute.matches(dt.minute())
            && self.hour.matches(dt.hour())
            && self.day.matches(dt.day())
            && self.month.matches(dt.month())
            // 7 is an accepted alias for Sunday; normalize before matching
            && self.weekday.matches(dt.weekday().num_days_from_sunday())
    }

    /// Get the next matching minute strictly after the given datetime
    ///
    /// Returns `None` if no match is found within the next four years
    /// (an impossible day/month combination such as `0 0 31 2 *`).
    pub fn next_after<Tz: TimeZone>(&self, dt: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let mut current = dt.clone() - Duration::seconds(i64::from(dt.second()))
            - Duration::nanoseconds(i64::from(dt.nanosecond()))
            + Duration::minutes(1);

        // Search up to 4 years ahead, one minute at a time
        for _ in 0..(4 * 366 * 24 * 60) {
            if self.matches(&current) {
                return Some(current);
            }
            current += Duration::minutes(1);
        }

        None
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {} {}", self.minute, self.hour, self.day, self.month, self.weekday)
    }
}

/// A single cron field (minute, hour, day, month, weekday)
#[derive(Debug, Clone, PartialEq, Eq)]
enum CronField {
    Any,
    Single(u32),
    Range(u32, u32),
    Step(u32, u32),         // explicit start, step
    WildcardStep(u32, u32), // field minimum, step (parsed from "*/n")
    List(Vec<CronField>),
}

impl CronField {
    fn parse(s: &str, min: u32, max: u32) -> Result<Self, CronParseError> {
        if s == "*" {
            return Ok(CronField::Any);
        }

        // Lists may themselves contain ranges and steps: "1-5,8,*/10"
        if s.contains(',') {
            let parts: Result<Vec<CronField>, _> =
                s.split(',').map(|part| CronField::parse(part.trim(), min, max)).collect();
            return Ok(CronField::List(parts?));
        }

        if let Some((base, step)) = s.split_once('/') {
            let step: u32 = step.parse().map_err(|_| CronParseError::InvalidField(s.to_string()))?;

            if step == 0 {
                return Err(CronParseError::InvalidField(s.to_string()));
            }

            if base == "*" {
                return Ok(CronField::WildcardStep(min, step));
            }
            let start: u32 =
                base.parse().map_err(|_| CronParseError::InvalidField(s.to_string()))?;
            return Ok(CronField::Step(start, step));
        }

        if let Some((start, end)) = s.split_once('-') {
            let start: u32 =
                start.parse().map_err(|_| CronParseError::InvalidField(s.to_string()))?;
            let end: u32 = end.parse().map_err(|_| CronParseError::InvalidField(s.to_string()))?;

            if start < min || end > max || start > end {
                return Err(CronParseError::InvalidRange(format!(
                    "{}-{} not valid in range {}-{}",
                    start, end, min, max
                )));
            }

            return Ok(CronField::Range(start, end));
        }

        let value: u32 = s.parse().map_err(|_| CronParseError::InvalidField(s.to_string()))?;

        if value < min || value > max {
            return Err(CronParseError::InvalidRange(format!(
                "{} not in range {}-{}",
                value, min, max
            )));
        }

        Ok(CronField::Single(value))
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            CronField::Any => true,
            // Weekday field only: single 7 is Sunday
            CronField::Single(v) => *v == value || (*v == 7 && value == 0),
            CronField::Range(start, end) => value >= *start && value <= *end,
            CronField::Step(start, step) | CronField::WildcardStep(start, step) => {
                value >= *start && (value - start) % step == 0
            }
            CronField::List(fields) => fields.iter().any(|f| f.matches(value)),
        }
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CronField::Any => write!(f, "*"),
            CronField::Single(v) => write!(f, "{}", v),
            CronField::Range(start, end) => write!(f, "{}-{}", start, end),
            CronField::Step(start, step) => write!(f, "{}/{}", start, step),
            CronField::WildcardStep(_, step) => write!(f, "*/{}", step),
            CronField::List(fields) => {
                let parts: Vec<String> = fields.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for time::cron.
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;

    use super::*;

    /// Validates `CronExpression::parse` behavior for the parse every minute
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `cron.minute` equals `CronField::Any`.
    #[test]
    fn test_parse_every_minute() {
        let cron = CronExpression::parse("* * * * *").unwrap();
        assert_eq!(cron.minute, CronField::Any);
    }

    /// Validates `CronExpression::parse` behavior for the parse specific time
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `cron.minute` equals `CronField::Single(30)`.
    /// - Confirms `cron.hour` equals `CronField::Single(14)`.
    #[test]
    fn test_parse_specific_time() {
        let cron = CronExpression::parse("30 14 * * *").unwrap();
        assert_eq!(cron.minute, CronField::Single(30));
        assert_eq!(cron.hour, CronField::Single(14));
    }

    /// Validates `CronExpression::parse` behavior for the parse range scenario.
    ///
    /// Assertions:
    /// - Confirms `cron.hour` equals `CronField::Range(9, 17)`.
    #[test]
    fn test_parse_range() {
        let cron = CronExpression::parse("0 9-17 * * *").unwrap();
        assert_eq!(cron.hour, CronField::Range(9, 17));
    }

    /// Validates `CronExpression::parse` behavior for the parse list scenario.
    ///
    /// Assertions:
    /// - Confirms `cron.weekday` parses into a list of three single days.
    #[test]
    fn test_parse_list() {
        let cron = CronExpression::parse("0 0 * * 1,3,5").unwrap();
        assert_eq!(
            cron.weekday,
            CronField::List(vec![
                CronField::Single(1),
                CronField::Single(3),
                CronField::Single(5),
            ])
        );
    }

    /// Validates `CronExpression::parse` behavior for the parse step scenario.
    ///
    /// Assertions:
    /// - Confirms `cron.minute` equals `CronField::WildcardStep(0, 5)`.
    /// - Confirms `cron.hour` equals `CronField::Step(9, 3)`.
    #[test]
    fn test_parse_step() {
        let cron = CronExpression::parse("*/5 9/3 * * *").unwrap();
        assert_eq!(cron.minute, CronField::WildcardStep(0, 5));
        assert_eq!(cron.hour, CronField::Step(9, 3));
    }

    /// Validates mixed list members (ranges and steps inside a list).
    #[test]
    fn test_parse_list_with_range() {
        let cron = CronExpression::parse("0 0 * * 1-3,6").unwrap();
        assert_eq!(
            cron.weekday,
            CronField::List(vec![CronField::Range(1, 3), CronField::Single(6)])
        );
    }

    /// Validates `CronExpression::matches` behavior for the matches scenario.
    ///
    /// Assertions:
    /// - Ensures `cron.matches(&dt)` evaluates to true.
    /// - Ensures `!cron.matches(&dt)` evaluates to true.
    #[test]
    fn test_matches() {
        let cron = CronExpression::parse("30 14 * * *").unwrap();

        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 14, 30, 0).unwrap();
        assert!(cron.matches(&dt));

        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 14, 31, 0).unwrap();
        assert!(!cron.matches(&dt));
    }

    /// Validates minute-of-hour matching against a two-hour list.
    ///
    /// Assertions:
    /// - Due only when minute is 0 and hour is 10 or 20.
    #[test]
    fn test_matches_hour_list() {
        let cron = CronExpression::parse("0 10,20 * * *").unwrap();

        assert!(cron.matches(&Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()));
        assert!(cron.matches(&Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap()));
        assert!(!cron.matches(&Utc.with_ymd_and_hms(2024, 6, 1, 10, 1, 0).unwrap()));
        assert!(!cron.matches(&Utc.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap()));
    }

    /// Validates weekday matching, including the `7 == Sunday` alias.
    #[test]
    fn test_matches_weekday() {
        // 2024-01-07 is a Sunday
        let sunday = Utc.with_ymd_and_hms(2024, 1, 7, 0, 0, 0).unwrap();
        assert!(CronExpression::parse("0 0 * * 0").unwrap().matches(&sunday));
        assert!(CronExpression::parse("0 0 * * 7").unwrap().matches(&sunday));

        // 2024-01-08 is a Monday
        let monday = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        assert!(CronExpression::parse("0 0 * * 1-5").unwrap().matches(&monday));
        assert!(!CronExpression::parse("0 0 * * 0,6").unwrap().matches(&monday));
    }

    /// Validates matching in a non-UTC zone: the caller converts first.
    #[test]
    fn test_matches_in_timezone() {
        let cron = CronExpression::parse("30 9 * * *").unwrap();
        let tz: Tz = "America/New_York".parse().unwrap();

        // 14:30 UTC == 09:30 in New York (EST, January)
        let utc = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap();
        assert!(!cron.matches(&utc));
        assert!(cron.matches(&utc.with_timezone(&tz)));
    }

    /// Validates `CronExpression::next_after` behavior for the next after
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `next.hour()` equals `0`.
    /// - Confirms `next.minute()` equals `0`.
    /// - Ensures `next > dt` evaluates to true.
    #[test]
    fn test_next_after() {
        let cron = CronExpression::parse("0 0 * * *").unwrap();

        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let next = cron.next_after(&dt).unwrap();

        assert_eq!(next.hour(), 0);
        assert_eq!(next.minute(), 0);
        assert_eq!(next.day(), 2);
        assert!(next > dt);
    }

    /// Validates that `next_after` ignores sub-minute precision on the
    /// starting instant.
    #[test]
    fn test_next_after_truncates_seconds() {
        let cron = CronExpression::parse("* * * * *").unwrap();
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 31).unwrap();
        let next = cron.next_after(&dt).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 12, 1, 0).unwrap());
    }

    /// Validates `CronExpression::parse` behavior for the invalid expression
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures `CronExpression::parse("invalid").is_err()` evaluates to true.
    /// - Ensures `CronExpression::parse("60 * * * *").is_err()` evaluates to
    ///   true.
    /// - Ensures `CronExpression::parse("* 25 * * *").is_err()` evaluates to
    ///   true.
    #[test]
    fn test_invalid_expression() {
        assert!(CronExpression::parse("invalid").is_err());
        assert!(CronExpression::parse("60 * * * *").is_err());
        assert!(CronExpression::parse("* 25 * * *").is_err());
        assert!(CronExpression::parse("* * * *").is_err());
        assert!(CronExpression::parse("* * * * * *").is_err());
        assert!(CronExpression::parse("*/0 * * * *").is_err());
    }

    /// Validates `Display` round-trips the textual form.
    #[test]
    fn test_display_round_trip() {
        for expr in ["* * * * *", "0 0 * * *", "*/5 9-17 1,15 * 1-5", "30 14 * * 0"] {
            let cron = CronExpression::parse(expr).unwrap();
            assert_eq!(cron.to_string(), expr);
        }
    }
}
