//! Cron schedules: "MIN HOUR DOM MON DOW" (5-field, no seconds).
//! Per field: `*`, `N`, `A-B`, `a,b,c`, `*/S`, `A-B/S`, `N/S`.
//! Month names (JAN..DEC) and weekday names (SUN..SAT) are accepted; weekday 7 is Sunday.
//! Example: "0 8 * * MON-FRI" = weekdays at 8:00
//!
//! Matching is done by the `cron` crate on local wall-clock time; the
//! result is mapped back through the job's IANA zone and returned in UTC.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use vigil_core::config::parse_timezone;
use vigil_core::{Result, VigilError};

/// How far ahead `next_after` searches before giving up.
const SEARCH_HORIZON_YEARS: i32 = 5;

const FIELDS: [(&str, u32, u32); 5] = [
    ("minute", 0, 59),
    ("hour", 0, 23),
    ("day-of-month", 1, 31),
    ("month", 1, 12),
    ("day-of-week", 0, 7),
];

const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// A validated 5-field cron expression.
///
/// When both day-of-month and day-of-week are restricted a day matches if
/// either does, so the expression is split into one schedule per day field.
#[derive(Clone)]
pub struct CronSchedule {
    expression: String,
    schedules: Vec<::cron::Schedule>,
}

impl CronSchedule {
    /// Parse an expression, rejecting anything that is not a valid 5-field cron.
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(VigilError::invalid_schedule(
                expression,
                format!(
                    "expected 5 fields (MIN HOUR DOM MON DOW), got {}",
                    parts.len()
                ),
            ));
        }
        for (part, field) in parts.iter().zip(FIELDS) {
            check_field(expression, part, field)?;
        }

        let (minute, hour, dom, month) = (parts[0], parts[1], parts[2], parts[3]);
        let dow = weekday_field(expression, parts[4])?;
        // `cron` wants a leading seconds field
        let layouts = if !is_wildcard(dom) && !is_wildcard(parts[4]) {
            vec![
                format!("0 {minute} {hour} {dom} {month} *"),
                format!("0 {minute} {hour} * {month} {dow}"),
            ]
        } else {
            vec![format!("0 {minute} {hour} {dom} {month} {dow}")]
        };

        let schedules = layouts
            .iter()
            .map(|layout| {
                ::cron::Schedule::from_str(layout)
                    .map_err(|e| VigilError::invalid_schedule(expression, e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            expression: parts.join(" "),
            schedules,
        })
    }

    /// First matching instant strictly after `after`, evaluated in `tz`.
    ///
    /// Local times skipped by a DST jump never match; local times repeated
    /// by a DST fall-back match once, at the earlier instant.
    pub fn next_after(&self, after: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        // Walk wall-clock time on a zone-free axis, then resolve each candidate in `tz`.
        let wall_start = Utc.from_utc_datetime(&after.with_timezone(&tz).naive_local());
        let last_year = wall_start.year() + SEARCH_HORIZON_YEARS;

        self.schedules
            .iter()
            .filter_map(|schedule| {
                schedule
                    .after(&wall_start)
                    .take_while(|wall| wall.year() <= last_year)
                    .find_map(|wall| resolve_local(tz, wall.naive_utc(), after))
            })
            .min()
    }
}

impl FromStr for CronSchedule {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expression).finish()
    }
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Eq for CronSchedule {}

/// Validate `expression` and `timezone`, then compute the next run strictly after `after`.
///
/// Expressions that never fire within the search horizon (e.g. `0 0 30 2 *`)
/// are rejected as invalid.
pub fn next_run_from_cron(
    expression: &str,
    timezone: &str,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let schedule = CronSchedule::parse(expression)?;
    let tz = parse_timezone(timezone)?;
    schedule.next_after(after, tz).ok_or_else(|| {
        VigilError::invalid_schedule(
            expression,
            format!("no occurrence within {SEARCH_HORIZON_YEARS} years"),
        )
    })
}

fn resolve_local(tz: Tz, wall: NaiveDateTime, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let local = match tz.from_local_datetime(&wall) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => return None,
    };
    let utc = local.with_timezone(&Utc);
    (utc > after).then_some(utc)
}

fn is_wildcard(field: &str) -> bool {
    field.starts_with('*')
}

/// Reject empty list items, zero steps, reversed or out-of-range numeric values.
/// Names and anything else are left to the `cron` parser.
fn check_field(expression: &str, text: &str, (name, min, max): (&str, u32, u32)) -> Result<()> {
    let invalid = |reason: String| {
        VigilError::invalid_schedule(expression, format!("{name} field '{text}': {reason}"))
    };

    for item in text.split(',') {
        let range = match item.split_once('/') {
            Some((range, step)) => {
                match step.parse::<u32>() {
                    Ok(0) => return Err(invalid("step must be positive".into())),
                    Ok(_) => {}
                    Err(_) => return Err(invalid(format!("bad step '{step}'"))),
                }
                range
            }
            None => item,
        };
        if range.is_empty() {
            return Err(invalid("empty list item".into()));
        }

        let (a, b) = range.split_once('-').unwrap_or((range, range));
        for value in [a, b] {
            if let Ok(n) = value.parse::<u32>() {
                if n < min || n > max {
                    return Err(invalid(format!("values must be within {min}-{max}")));
                }
            }
        }
        if let (Ok(a), Ok(b)) = (a.parse::<u32>(), b.parse::<u32>()) {
            if a > b {
                return Err(invalid(format!("range {a}-{b} is reversed")));
            }
        }
    }
    Ok(())
}

/// Rewrite a day-of-week field (0-7, Sunday = 0 or 7) as an explicit list in
/// the `cron` crate's numbering (1-7, Sunday = 1).
fn weekday_field(expression: &str, text: &str) -> Result<String> {
    if text == "*" {
        return Ok("*".into());
    }
    let invalid = |reason: String| {
        VigilError::invalid_schedule(expression, format!("day-of-week field '{text}': {reason}"))
    };
    let weekday = |token: &str| -> Result<usize> {
        match token.parse::<usize>() {
            Ok(n) if n <= 7 => Ok(n),
            Ok(_) => Err(invalid("values must be within 0-7".into())),
            Err(_) => WEEKDAY_NAMES
                .iter()
                .position(|name| name.eq_ignore_ascii_case(token))
                .ok_or_else(|| invalid(format!("bad value '{token}'"))),
        }
    };

    let mut days = [false; 7];
    for item in text.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, step.parse::<usize>().unwrap_or(1)),
            None => (item, 1),
        };
        let (start, end) = match range.split_once('-') {
            _ if range == "*" => (0, 6),
            Some((a, b)) => (weekday(a)?, weekday(b)?),
            // "N/S" runs from N to the end of the week
            None if item.contains('/') => (weekday(range)?, 7),
            None => {
                let n = weekday(range)?;
                (n, n)
            }
        };
        if start > end {
            return Err(invalid(format!("range {start}-{end} is reversed")));
        }
        for day in (start..=end).step_by(step.max(1)) {
            days[day % 7] = true;
        }
    }

    Ok(days
        .iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .map(|(day, _)| (day + 1).to_string())
        .collect::<Vec<_>>()
        .join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn next(expr: &str, after: DateTime<Utc>) -> DateTime<Utc> {
        CronSchedule::parse(expr)
            .unwrap()
            .next_after(after, chrono_tz::UTC)
            .unwrap()
    }

    #[test]
    fn test_every_hour() {
        let next = next("0 * * * *", utc(2026, 2, 22, 10, 30));
        assert_eq!(next, utc(2026, 2, 22, 11, 0));
    }

    #[test]
    fn test_specific_time() {
        let next = next("0 8 * * *", utc(2026, 2, 22, 7, 0));
        assert_eq!(next, utc(2026, 2, 22, 8, 0));
    }

    #[test]
    fn test_every_15_minutes() {
        let next = next("*/15 * * * *", utc(2026, 2, 22, 10, 2));
        assert_eq!(next.minute(), 15);
    }

    #[test]
    fn test_strictly_after_matching_instant() {
        let next = next("0 * * * *", utc(2026, 2, 22, 10, 0));
        assert_eq!(next, utc(2026, 2, 22, 11, 0));
    }

    #[test]
    fn test_hour_range_with_step() {
        // last slot of the window, next is the first slot tomorrow
        let next = next("*/30 8-22 * * *", utc(2026, 2, 22, 22, 30));
        assert_eq!(next, utc(2026, 2, 23, 8, 0));
    }

    #[test]
    fn test_lists_and_ranges() {
        let next = next("15,45 9-10 * * *", utc(2026, 2, 22, 10, 20));
        assert_eq!(next, utc(2026, 2, 22, 10, 45));
    }

    #[test]
    fn test_weekday_names() {
        // 2026-02-21 is a Saturday
        let next = next("0 9 * * MON-FRI", utc(2026, 2, 21, 12, 0));
        assert_eq!(next, utc(2026, 2, 23, 9, 0));
    }

    #[test]
    fn test_weekday_numbers() {
        // 1-5 is Monday to Friday; 2026-02-21 is a Saturday
        let next = next("0 9 * * 1-5", utc(2026, 2, 21, 12, 0));
        assert_eq!(next, utc(2026, 2, 23, 9, 0));
        // 6 is Saturday
        let next = self::next("0 9 * * 6", utc(2026, 2, 16, 0, 0));
        assert_eq!(next, utc(2026, 2, 21, 9, 0));
    }

    #[test]
    fn test_sunday_as_seven() {
        let seven = CronSchedule::parse("0 0 * * 7").unwrap();
        let zero = CronSchedule::parse("0 0 * * 0").unwrap();
        let after = utc(2026, 2, 18, 0, 0);
        assert_eq!(
            seven.next_after(after, chrono_tz::UTC),
            zero.next_after(after, chrono_tz::UTC)
        );
        assert_eq!(seven.next_after(after, chrono_tz::UTC), Some(utc(2026, 2, 22, 0, 0)));
    }

    #[test]
    fn test_weekday_range_ending_on_seven() {
        // Friday through Sunday; 2026-02-16 is a Monday
        let next = next("0 0 * * 5-7", utc(2026, 2, 16, 0, 0));
        assert_eq!(next, utc(2026, 2, 20, 0, 0));
        assert_eq!(weekday_field("x", "5-7").unwrap(), "1,6,7");
    }

    #[test]
    fn test_month_names_and_rollover() {
        let next = next("0 0 1 jan *", utc(2026, 6, 1, 0, 0));
        assert_eq!(next, utc(2027, 1, 1, 0, 0));
    }

    #[test]
    fn test_dom_or_dow_when_both_restricted() {
        // the 25th, or any Monday; 2026-02-23 is a Monday and comes first
        let monday = next("0 12 25 * 1", utc(2026, 2, 22, 0, 0));
        assert_eq!(monday, utc(2026, 2, 23, 12, 0));
        // after that Monday, the 25th (a Wednesday) comes before the next Monday
        let dom = next("0 12 25 * 1", monday);
        assert_eq!(dom, utc(2026, 2, 25, 12, 0));
    }

    #[test]
    fn test_timezone_offset() {
        let schedule = CronSchedule::parse("0 9 * * *").unwrap();
        let next = schedule
            .next_after(utc(2026, 1, 15, 12, 0), chrono_tz::America::New_York)
            .unwrap();
        // 09:00 EST == 14:00 UTC
        assert_eq!(next, utc(2026, 1, 15, 14, 0));
    }

    #[test]
    fn test_dst_gap_is_skipped() {
        // 2026-03-08 02:30 does not exist in New York
        let schedule = CronSchedule::parse("30 2 * * *").unwrap();
        let next = schedule
            .next_after(utc(2026, 3, 8, 5, 0), chrono_tz::America::New_York)
            .unwrap();
        assert_eq!(next, utc(2026, 3, 9, 6, 30));
    }

    #[test]
    fn test_dst_overlap_fires_once() {
        let schedule = CronSchedule::parse("30 1 * * *").unwrap();
        let tz = chrono_tz::America::New_York;
        let first = schedule.next_after(utc(2026, 11, 1, 4, 0), tz).unwrap();
        assert_eq!(first, utc(2026, 11, 1, 5, 30));
        let second = schedule.next_after(first, tz).unwrap();
        assert_eq!(second, utc(2026, 11, 2, 6, 30));
    }

    #[test]
    fn test_invalid_expressions() {
        for expr in [
            "bad",
            "* * * *",
            "* * * * * *",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * 13 *",
            "* * * * 8",
            "*/0 * * * *",
            "5-1 * * * *",
            "a * * * *",
            "1,,2 * * * *",
            "* * * * FUNDAY",
        ] {
            assert!(CronSchedule::parse(expr).is_err(), "{expr} should be rejected");
        }
    }

    #[test]
    fn test_normalised_text() {
        let schedule: CronSchedule = "  */5   *  * * *".parse().unwrap();
        assert_eq!(schedule.to_string(), "*/5 * * * *");
    }

    #[test]
    fn test_never_firing_expression() {
        let err = next_run_from_cron("0 0 30 2 *", "UTC", Utc::now()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_unknown_timezone() {
        let err = next_run_from_cron("0 * * * *", "Nowhere/City", Utc::now()).unwrap_err();
        assert!(matches!(err, VigilError::InvalidTimezone(_)));
    }
}
