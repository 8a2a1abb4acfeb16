//! Five-field cron expressions: `minute hour day-of-month month day-of-week`.
//!
//! Each field accepts `*`, `*/n`, `a`, `a-b`, `a-b/n` and comma-separated
//! lists of those. Day-of-week is 0-6 with Sunday = 0 (7 is accepted as
//! Sunday too). When both day fields are restricted a day matches if either
//! does, as in classic cron.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};

use crate::error::{Result, SchedulerError};

/// Days scanned by [`CronExpression::next_after`]; covers a leap-day cycle.
const SEARCH_DAYS: i64 = 366 * 4 + 1;

/// Allowed values of one field, as a bitset over 0..=63.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet {
    bits: u64,
    /// Written as `*` (matters for the day-of-month / day-of-week rule).
    wildcard: bool,
}

impl FieldSet {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.bits & (1u64 << value) != 0
    }

    fn first_from(&self, from: u32, max: u32) -> Option<u32> {
        (from..=max).find(|v| self.contains(*v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    source: String,
    minute: FieldSet,
    hour: FieldSet,
    day: FieldSet,
    month: FieldSet,
    weekday: FieldSet,
}

fn invalid(field: &str, part: &str, why: &str) -> SchedulerError {
    SchedulerError::InvalidSchedule(format!("cron {field} field '{part}': {why}"))
}

fn parse_number(field: &str, part: &str, s: &str) -> Result<u32> {
    s.parse::<u32>().map_err(|_| invalid(field, part, "not a number"))
}

fn parse_field(name: &str, text: &str, min: u32, max: u32) -> Result<FieldSet> {
    let mut bits = 0u64;
    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((r, s)) => {
                let step = parse_number(name, part, s)?;
                if step == 0 {
                    return Err(invalid(name, part, "step must be positive"));
                }
                (r, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_number(name, part, a)?, parse_number(name, part, b)?)
        } else {
            let v = parse_number(name, part, range)?;
            // `5/15` means "from 5, every 15"
            if step > 1 {
                (v, max)
            } else {
                (v, v)
            }
        };
        if start < min || end > max || start > end {
            return Err(invalid(name, part, &format!("values must be {min}-{max}")));
        }

        let mut v = start;
        while v <= end {
            bits |= 1u64 << v;
            v += step;
        }
    }
    Ok(FieldSet {
        bits,
        wildcard: text == "*",
    })
}

impl CronExpression {
    /// Parse a five-field expression.
    pub fn parse(expr: &str) -> Result<Self> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(SchedulerError::InvalidSchedule(format!(
                "cron expression must have 5 fields, got {}: '{expr}'",
                parts.len()
            )));
        }

        let mut weekday = parse_field("day-of-week", parts[4], 0, 7)?;
        if weekday.contains(7) {
            weekday.bits = (weekday.bits & !(1u64 << 7)) | 1;
        }

        Ok(Self {
            source: parts.join(" "),
            minute: parse_field("minute", parts[0], 0, 59)?,
            hour: parse_field("hour", parts[1], 0, 23)?,
            day: parse_field("day-of-month", parts[2], 1, 31)?,
            month: parse_field("month", parts[3], 1, 12)?,
            weekday,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        if !self.month.contains(date.month()) {
            return false;
        }
        let dom = self.day.contains(date.day());
        let dow = self.weekday.contains(date.weekday().num_days_from_sunday());
        match (self.day.wildcard, self.weekday.wildcard) {
            (false, false) => dom || dow,
            _ => dom && dow,
        }
    }

    /// Whether `time` (truncated to the minute) is a firing instant.
    pub fn matches(&self, time: &DateTime<Utc>) -> bool {
        self.day_matches(time.date_naive())
            && self.hour.contains(time.hour())
            && self.minute.contains(time.minute())
    }

    /// First firing instant strictly after `after`, to the minute.
    ///
    /// `None` when the expression never fires (e.g. `0 0 30 2 *`).
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let first_day = start.date_naive();

        for offset in 0..SEARCH_DAYS {
            let date = first_day + Duration::days(offset);
            if !self.day_matches(date) {
                continue;
            }
            let (from_hour, from_minute) = if offset == 0 {
                (start.hour(), start.minute())
            } else {
                (0, 0)
            };
            for hour in from_hour..24 {
                if !self.hour.contains(hour) {
                    continue;
                }
                let min_from = if hour == from_hour { from_minute } else { 0 };
                if let Some(minute) = self.minute.first_from(min_from, 59) {
                    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
                    return Some(date.and_time(time).and_utc());
                }
            }
        }
        None
    }
}

impl std::fmt::Display for CronExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn parses_common_forms() {
        for expr in ["* * * * *", "0 3 * * *", "*/15 9-17 * * 1-5", "0 0 1,15 * *", "30 6 * * 7"] {
            assert!(CronExpression::parse(expr).is_ok(), "{expr}");
        }
    }

    #[test]
    fn rejects_malformed() {
        for expr in ["", "invalid", "* * *", "60 * * * *", "* 24 * * *", "*/0 * * * *", "5-1 * * * *", "* * 0 * *", "a b c d e"] {
            assert!(CronExpression::parse(expr).is_err(), "{expr}");
        }
    }

    #[test]
    fn next_daily_fire() {
        let cron = CronExpression::parse("0 3 * * *").unwrap();
        assert_eq!(cron.next_after(&at(2026, 1, 10, 2, 59)), Some(at(2026, 1, 10, 3, 0)));
        assert_eq!(cron.next_after(&at(2026, 1, 10, 3, 0)), Some(at(2026, 1, 11, 3, 0)));
    }

    #[test]
    fn next_with_step_and_weekday() {
        // 2026-01-10 is a Saturday
        let cron = CronExpression::parse("*/20 9 * * 1").unwrap();
        assert_eq!(cron.next_after(&at(2026, 1, 10, 12, 0)), Some(at(2026, 1, 12, 9, 0)));
        assert_eq!(cron.next_after(&at(2026, 1, 12, 9, 0)), Some(at(2026, 1, 12, 9, 20)));
        assert_eq!(cron.next_after(&at(2026, 1, 12, 9, 40)), Some(at(2026, 1, 19, 9, 0)));
    }

    #[test]
    fn sunday_is_zero_or_seven() {
        let zero = CronExpression::parse("0 12 * * 0").unwrap();
        let seven = CronExpression::parse("0 12 * * 7").unwrap();
        let from = at(2026, 1, 10, 0, 0);
        assert_eq!(zero.next_after(&from), Some(at(2026, 1, 11, 12, 0)));
        assert_eq!(zero.next_after(&from), seven.next_after(&from));
    }

    #[test]
    fn restricted_day_fields_match_either() {
        // the 1st of the month or any Monday
        let cron = CronExpression::parse("0 0 1 * 1").unwrap();
        assert_eq!(cron.next_after(&at(2026, 1, 10, 0, 0)), Some(at(2026, 1, 12, 0, 0)));
        assert_eq!(cron.next_after(&at(2026, 1, 26, 0, 0)), Some(at(2026, 2, 1, 0, 0)));
    }

    #[test]
    fn impossible_date_never_fires() {
        let cron = CronExpression::parse("0 0 30 2 *").unwrap();
        assert_eq!(cron.next_after(&at(2026, 1, 1, 0, 0)), None);
    }

    #[test]
    fn leap_day_is_found() {
        let cron = CronExpression::parse("0 0 29 2 *").unwrap();
        assert_eq!(cron.next_after(&at(2026, 3, 1, 0, 0)), Some(at(2028, 2, 29, 0, 0)));
    }
}
