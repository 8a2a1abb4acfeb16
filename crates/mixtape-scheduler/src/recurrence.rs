use chrono::{DateTime, Duration, Utc};
use mixtape_core::{Recurrence, Schedule};
use tracing::warn;

use crate::cron::CronExpression;

/// Named intervals accepted in `Recurrence::Interval`.
pub const INTERVALS: &[(&str, i64)] = &[
    ("hourly", 1),
    ("every-1h", 1),
    ("every-3h", 3),
    ("every-6h", 6),
    ("every-12h", 12),
    ("daily", 24),
    ("every-2d", 48),
    ("every-3d", 72),
    ("weekly", 7 * 24),
    ("every-2w", 14 * 24),
    ("biweekly", 14 * 24),
    ("monthly", 30 * 24),
];

/// Duration of a named interval, `None` if the name is not in the vocabulary.
pub fn interval_duration(every: &str) -> Option<Duration> {
    let every = every.trim().to_ascii_lowercase();
    INTERVALS
        .iter()
        .find(|(name, _)| *name == every)
        .map(|(_, hours)| Duration::hours(*hours))
}

/// Evaluable form of a schedule's recurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Every(Duration),
    Cron(CronExpression),
}

impl Trigger {
    /// Interpret `recurrence`. Never fails: an unknown interval becomes daily
    /// and a cron expression that does not parse (or never fires) becomes
    /// `fallback`.
    pub fn from_recurrence(recurrence: &Recurrence, fallback: &CronExpression) -> Self {
        match recurrence {
            Recurrence::Interval { every } => match interval_duration(every) {
                Some(d) => Trigger::Every(d),
                None => {
                    warn!(interval = %every, "unknown interval, using daily");
                    Trigger::Every(Duration::days(1))
                }
            },
            Recurrence::Cron { expression } => match CronExpression::parse(expression) {
                Ok(cron) if cron.next_after(&Utc::now()).is_some() => Trigger::Cron(cron),
                Ok(_) => {
                    warn!(%expression, fallback = %fallback, "cron expression never fires, using fallback");
                    Trigger::Cron(fallback.clone())
                }
                Err(e) => {
                    warn!(%expression, fallback = %fallback, error = %e, "malformed cron expression, using fallback");
                    Trigger::Cron(fallback.clone())
                }
            },
        }
    }

    /// Next fire time as seen at `now`.
    ///
    /// Intervals count from the last run; a run missed while the process was
    /// down fires once, immediately. Cron fires at its next matching minute.
    pub fn next_fire(&self, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Trigger::Every(every) => match last_run {
                Some(last) if last + *every > now => last + *every,
                Some(_) => now,
                None => now + *every,
            },
            Trigger::Cron(cron) => cron
                .next_after(&now)
                .unwrap_or_else(|| now + Duration::days(1)),
        }
    }
}

/// Next fire time of a schedule, for display.
pub fn next_fire_for(schedule: &Schedule, fallback: &CronExpression, now: DateTime<Utc>) -> DateTime<Utc> {
    Trigger::from_recurrence(&schedule.recurrence, fallback).next_fire(schedule.last_run_at, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fallback() -> CronExpression {
        CronExpression::parse("0 3 * * *").unwrap()
    }

    #[test]
    fn vocabulary_maps_to_durations() {
        assert_eq!(interval_duration("every-6h"), Some(Duration::hours(6)));
        assert_eq!(interval_duration("Daily"), Some(Duration::days(1)));
        assert_eq!(interval_duration("every-3d"), Some(Duration::days(3)));
        assert_eq!(interval_duration("weekly"), Some(Duration::weeks(1)));
        assert_eq!(interval_duration("biweekly"), interval_duration("every-2w"));
        assert_eq!(interval_duration("every-5m"), None);
    }

    #[test]
    fn unknown_interval_falls_back_to_daily() {
        let t = Trigger::from_recurrence(&Recurrence::interval("fortnightly-ish"), &fallback());
        assert_eq!(t, Trigger::Every(Duration::days(1)));
    }

    #[test]
    fn malformed_cron_falls_back() {
        let t = Trigger::from_recurrence(&Recurrence::cron("every tuesday"), &fallback());
        assert_eq!(t, Trigger::Cron(fallback()));
        let t = Trigger::from_recurrence(&Recurrence::cron("0 0 31 2 *"), &fallback());
        assert_eq!(t, Trigger::Cron(fallback()));
    }

    #[test]
    fn interval_next_fire() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let six = Trigger::Every(Duration::hours(6));

        assert_eq!(six.next_fire(None, now), now + Duration::hours(6));
        let recent = now - Duration::hours(1);
        assert_eq!(six.next_fire(Some(recent), now), recent + Duration::hours(6));
        // missed while offline: fire once, right away
        assert_eq!(six.next_fire(Some(now - Duration::days(3)), now), now);
    }

    #[test]
    fn cron_next_fire_ignores_last_run() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let t = Trigger::Cron(fallback());
        let expected = Utc.with_ymd_and_hms(2026, 5, 2, 3, 0, 0).unwrap();
        assert_eq!(t.next_fire(None, now), expected);
        assert_eq!(t.next_fire(Some(now - Duration::days(9)), now), expected);
    }
}
