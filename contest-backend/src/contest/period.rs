//! Contest period boundaries from a cron schedule evaluated in a timezone

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;

use crate::error::{ContestError, ContestResult};
use crate::models::ModuleConfig;

/// Half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn contains(&self, t: &DateTime<Utc>) -> bool {
        *t >= self.start && *t < self.end
    }

    pub fn length(&self) -> Duration {
        self.end - self.start
    }
}

/// Convert a standard 5-field cron expression to the 6-field form the `cron`
/// crate expects.
///
/// Seconds are pinned to 0 and numeric day-of-week values are translated from
/// the standard numbering (0 or 7 = Sunday) to the crate's (1 = Sunday).
/// Other field counts pass through unchanged.
pub fn normalize_cron(expression: &str) -> String {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return expression.trim().to_string();
    }

    let dow = fields[4]
        .split(',')
        .map(convert_dow_item)
        .collect::<Vec<_>>()
        .join(",");

    format!("0 {} {} {} {} {}", fields[0], fields[1], fields[2], fields[3], dow)
}

fn convert_dow_item(item: &str) -> String {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };
    let with_step = |s: String| match step {
        Some(step) => format!("{}/{}", s, step),
        None => s,
    };

    let map = |v: u8| v % 7 + 1;

    if let Some((a, b)) = range.split_once('-') {
        return match (a.parse::<u8>(), b.parse::<u8>()) {
            (Ok(a), Ok(7)) if step.is_none() && a > 0 && a <= 7 => {
                // Range ending on Sunday wraps in the crate's numbering
                if a == 7 {
                    "1".to_string()
                } else {
                    format!("{}-7,1", map(a))
                }
            }
            (Ok(a), Ok(b)) if a <= 6 && b <= 6 => with_step(format!("{}-{}", map(a), map(b))),
            _ => item.to_string(),
        };
    }

    match range.parse::<u8>() {
        Ok(v) if v <= 7 => with_step(map(v).to_string()),
        _ => item.to_string(),
    }
}

/// Computes contest windows for one schedule
#[derive(Debug, Clone)]
pub struct PeriodCalculator {
    expression: String,
    timezone: Tz,
    schedule: Schedule,
}

impl PeriodCalculator {
    pub fn new(expression: &str, timezone: &str) -> ContestResult<Self> {
        let invalid = |reason: String| ContestError::InvalidSchedule {
            expression: expression.to_string(),
            timezone: timezone.to_string(),
            reason,
        };

        let tz = Tz::from_str(timezone).map_err(|_| invalid("unknown timezone".to_string()))?;
        let schedule = Schedule::from_str(&normalize_cron(expression))
            .map_err(|e| invalid(format!("unparseable expression: {}", e)))?;

        Ok(Self {
            expression: expression.to_string(),
            timezone: tz,
            schedule,
        })
    }

    pub fn for_module(module: &ModuleConfig) -> ContestResult<Self> {
        Self::new(&module.schedule, &module.timezone)
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The soonest `n` triggers strictly after `now`
    pub fn upcoming(&self, now: &DateTime<Utc>, n: usize) -> Vec<DateTime<Utc>> {
        self.schedule
            .after(&now.with_timezone(&self.timezone))
            .take(n)
            .map(|t| t.with_timezone(&Utc))
            .collect()
    }

    /// The two soonest triggers after `now` and their distance
    fn next_two(&self, now: &DateTime<Utc>) -> ContestResult<(DateTime<Utc>, Duration)> {
        match self.upcoming(now, 2).as_slice() {
            [first, second] => Ok((*first, *second - *first)),
            _ => Err(ContestError::InvalidSchedule {
                expression: self.expression.clone(),
                timezone: self.timezone.name().to_string(),
                reason: "fewer than two future occurrences".to_string(),
            }),
        }
    }

    pub fn next_trigger(&self, now: &DateTime<Utc>) -> ContestResult<DateTime<Utc>> {
        self.next_two(now).map(|(first, _)| first)
    }

    /// The open window: ends at the next trigger, spans one period length
    pub fn current_period(&self, now: &DateTime<Utc>) -> ContestResult<Period> {
        let (end, length) = self.next_two(now)?;
        Ok(Period {
            start: end - length,
            end,
        })
    }

    /// The window that closed most recently
    pub fn previous_period(&self, now: &DateTime<Utc>) -> ContestResult<Period> {
        let (end, length) = self.next_two(now)?;
        let current_start = end - length;
        Ok(Period {
            start: current_start - length,
            end: current_start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    #[test]
    fn test_normalize_cron() {
        assert_eq!(normalize_cron("0 0 * * *"), "0 0 0 * * *");
        assert_eq!(normalize_cron("0 0 * * 1"), "0 0 0 * * 2");
        assert_eq!(normalize_cron("0 0 * * 0"), "0 0 0 * * 1");
        assert_eq!(normalize_cron("0 0 * * 7"), "0 0 0 * * 1");
        assert_eq!(normalize_cron("0 0 * * 1-5"), "0 0 0 * * 2-6");
        assert_eq!(normalize_cron("0 0 * * 5-7"), "0 0 0 * * 6-7,1");
        assert_eq!(normalize_cron("0 0 * * 1,3"), "0 0 0 * * 2,4");
        assert_eq!(normalize_cron("30 9 * * MON"), "0 30 9 * * MON");
        assert_eq!(normalize_cron("0 0 0 * * *"), "0 0 0 * * *");
    }

    #[test]
    fn test_weekly_trigger_is_monday_midnight_local() {
        let calc = PeriodCalculator::new("0 0 * * 1", "America/New_York").unwrap();
        // Wednesday 2024-03-06 15:00 UTC
        let now = Utc.with_ymd_and_hms(2024, 3, 6, 15, 0, 0).unwrap();
        let next = calc.next_trigger(&now).unwrap().with_timezone(&calc.timezone());
        assert_eq!(next.weekday(), Weekday::Mon);
        assert_eq!((next.hour(), next.minute()), (0, 0));
        assert_eq!(next.day(), 11);
    }

    #[test]
    fn test_current_and_previous_are_adjacent() {
        let calc = PeriodCalculator::new("0 0 * * *", "UTC").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 13, 30, 0).unwrap();

        let current = calc.current_period(&now).unwrap();
        let previous = calc.previous_period(&now).unwrap();
        let length = current.length();

        assert_eq!(current.end, Utc.with_ymd_and_hms(2024, 5, 11, 0, 0, 0).unwrap());
        assert_eq!(current.start, Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap());
        assert_eq!(current.end, previous.end + length);
        assert_eq!(previous.end, current.start);
        assert!(current.contains(&now));
        assert!(!previous.contains(&current.start));
    }

    #[test]
    fn test_trigger_instant_starts_a_new_period() {
        let calc = PeriodCalculator::new("0 0 * * *", "UTC").unwrap();
        let trigger = Utc.with_ymd_and_hms(2024, 5, 11, 0, 0, 0).unwrap();

        // At the trigger instant the window that just closed is the previous one
        let previous = calc.previous_period(&trigger).unwrap();
        assert_eq!(previous.start, Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap());
        assert_eq!(previous.end, trigger);
    }

    #[test]
    fn test_monthly_period_length_follows_calendar() {
        let calc = PeriodCalculator::new("0 0 1 * *", "UTC").unwrap();
        // Next two triggers: Mar 1 and Apr 1 (31 days)
        let now = Utc.with_ymd_and_hms(2024, 2, 15, 0, 0, 0).unwrap();
        let current = calc.current_period(&now).unwrap();
        assert_eq!(current.end, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(current.length(), Duration::days(31));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            PeriodCalculator::new("0 0 * * 1", "Mars/Olympus"),
            Err(ContestError::InvalidSchedule { .. })
        ));
        assert!(matches!(
            PeriodCalculator::new("not a cron", "UTC"),
            Err(ContestError::InvalidSchedule { .. })
        ));

        // A single occurrence in a past year never yields two future triggers
        let calc = PeriodCalculator::new("0 0 0 1 1 * 2020", "UTC").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            calc.current_period(&now),
            Err(ContestError::InvalidSchedule { .. })
        ));
    }
}
