//! Cron expression evaluator.
//! Supports "MIN HOUR DOM MON DOW" (5-field) with an optional trailing
//! seconds field. Field syntax: *, N, N-M, */S, N/S, N-M/S, and comma lists.
//! DOW accepts 0-7 (0 and 7 are both Sunday).
//!
//! Evaluation is pure: (expression, now, last-fired) → due or not, with no
//! clock reads — the engine passes the reference timestamp in.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};

use leadloop_core::error::{LeadLoopError, Result};

/// How many days ahead `next_after` searches before giving up. Four years
/// covers any leap-day schedule.
const SEARCH_DAYS: i64 = 4 * 366;

/// A parsed cron schedule.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days: Vec<u32>,
    months: Vec<u32>,
    weekdays: Vec<u32>,
    seconds: Vec<u32>,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    /// Parse a cron expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 && parts.len() != 6 {
            return Err(LeadLoopError::Schedule(format!(
                "'{expression}' has {} fields (need 5: MIN HOUR DOM MON DOW, optional trailing seconds)",
                parts.len()
            )));
        }

        let minutes = parse_field(parts[0], 0, 59)?;
        let hours = parse_field(parts[1], 0, 23)?;
        let days = parse_field(parts[2], 1, 31)?;
        let months = parse_field(parts[3], 1, 12)?;
        // DOW range is 0-7; 7 folds to Sunday (0)
        let mut weekdays: Vec<u32> = parse_field(parts[4], 0, 7)?
            .into_iter()
            .map(|d| d % 7)
            .collect();
        weekdays.sort_unstable();
        weekdays.dedup();

        let seconds = if parts.len() == 6 {
            parse_field(parts[5], 0, 59)?
        } else {
            vec![0]
        };

        Ok(Self {
            dom_restricted: parts[2] != "*",
            dow_restricted: parts[4] != "*",
            minutes,
            hours,
            days,
            months,
            weekdays,
            seconds,
        })
    }

    /// First scheduled fire time strictly after `after`, if any exists
    /// within the search horizon.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.date_naive();
        for offset in 0..=SEARCH_DAYS {
            let date = start + Duration::days(offset);
            if !self.day_matches(date) {
                continue;
            }
            for &h in &self.hours {
                // Whole-day fast skip: every candidate in earlier hours of
                // day zero is <= after
                if offset == 0 && h < after.hour() {
                    continue;
                }
                for &m in &self.minutes {
                    for &s in &self.seconds {
                        let Some(naive) = date.and_hms_opt(h, m, s) else {
                            continue;
                        };
                        let candidate = Utc.from_utc_datetime(&naive);
                        if candidate > after {
                            return Some(candidate);
                        }
                    }
                }
            }
        }
        None
    }

    /// True iff at least one fire time was crossed in `(since, now]`.
    /// Multiple missed fire times collapse into a single due trigger.
    pub fn due(&self, now: DateTime<Utc>, since: DateTime<Utc>) -> bool {
        match self.next_after(since) {
            Some(fire) => fire <= now,
            None => false,
        }
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let month_ok = self.months.contains(&date.month());
        if !month_ok {
            return false;
        }
        let dom_ok = self.days.contains(&date.day());
        let dow_ok = self.weekdays.contains(&date.weekday().num_days_from_sunday());
        // Standard cron: when both day fields are restricted, either may match
        if self.dom_restricted && self.dow_restricted {
            dom_ok || dow_ok
        } else {
            dom_ok && dow_ok
        }
    }
}

/// Parse one cron field into a sorted list of matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Result<Vec<u32>> {
    let mut values = Vec::new();
    for item in field.split(',') {
        values.extend(parse_item(item, min, max).map_err(|e| {
            LeadLoopError::Schedule(format!("field '{field}': {e}"))
        })?);
    }
    if values.is_empty() {
        return Err(LeadLoopError::Schedule(format!("field '{field}' matches nothing")));
    }
    values.sort_unstable();
    values.dedup();
    Ok(values)
}

/// Parse a single list item: *, N, N-M, */S, N/S, N-M/S.
fn parse_item(item: &str, min: u32, max: u32) -> std::result::Result<Vec<u32>, String> {
    let (base, step) = match item.split_once('/') {
        Some((base, step_str)) => {
            let step: u32 = step_str
                .parse()
                .map_err(|_| format!("bad step '{step_str}'"))?;
            if step == 0 {
                return Err("step must be >= 1".into());
            }
            (base, step)
        }
        None => (item, 1),
    };

    let (lo, hi) = if base == "*" {
        (min, max)
    } else if let Some((a, b)) = base.split_once('-') {
        let lo: u32 = a.parse().map_err(|_| format!("bad number '{a}'"))?;
        let hi: u32 = b.parse().map_err(|_| format!("bad number '{b}'"))?;
        if lo > hi {
            return Err(format!("range {lo}-{hi} is inverted"));
        }
        (lo, hi)
    } else {
        let n: u32 = base.parse().map_err(|_| format!("bad number '{base}'"))?;
        // Bare N with a step (the N/S start/step form) runs N..max
        if item.contains('/') { (n, max) } else { (n, n) }
    };

    if lo < min || hi > max {
        return Err(format!("{lo}-{hi} outside {min}-{max}"));
    }
    Ok((lo..=hi).step_by(step as usize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_every_hour() {
        let schedule = CronSchedule::parse("0 * * * *").unwrap();
        let next = schedule.next_after(at(2026, 2, 22, 10, 30, 0)).unwrap();
        assert_eq!(next, at(2026, 2, 22, 11, 0, 0));
    }

    #[test]
    fn test_specific_time() {
        let schedule = CronSchedule::parse("0 8 * * *").unwrap();
        let next = schedule.next_after(at(2026, 2, 22, 7, 0, 0)).unwrap();
        assert_eq!(next, at(2026, 2, 22, 8, 0, 0));
        // Already past 8:00 — rolls to tomorrow
        let next = schedule.next_after(at(2026, 2, 22, 8, 0, 0)).unwrap();
        assert_eq!(next, at(2026, 2, 23, 8, 0, 0));
    }

    #[test]
    fn test_every_15_minutes() {
        let schedule = CronSchedule::parse("*/15 * * * *").unwrap();
        let next = schedule.next_after(at(2026, 2, 22, 10, 2, 0)).unwrap();
        assert_eq!(next, at(2026, 2, 22, 10, 15, 0));
    }

    #[test]
    fn test_start_step_form() {
        // N/S start/step form: start at N, step S to field max
        let schedule = CronSchedule::parse("0/30 * * * *").unwrap();
        let next = schedule.next_after(at(2026, 2, 22, 10, 0, 0)).unwrap();
        assert_eq!(next, at(2026, 2, 22, 10, 30, 0));
        let schedule = CronSchedule::parse("5/20 * * * *").unwrap();
        let next = schedule.next_after(at(2026, 2, 22, 10, 26, 0)).unwrap();
        assert_eq!(next, at(2026, 2, 22, 10, 45, 0));
    }

    #[test]
    fn test_range_with_step_and_weekdays() {
        // Engagement Monitor: every 30 min, business hours, weekdays
        let schedule = CronSchedule::parse("0/30 8-18 * * 1-5").unwrap();
        // Friday 2026-02-20 18:30 fires (18 is included in 8-18)
        let next = schedule.next_after(at(2026, 2, 20, 18, 5, 0)).unwrap();
        assert_eq!(next, at(2026, 2, 20, 18, 30, 0));
        // After Friday's last slot, rolls over the weekend to Monday 8:00
        let next = schedule.next_after(at(2026, 2, 20, 18, 30, 0)).unwrap();
        assert_eq!(next, at(2026, 2, 23, 8, 0, 0));
    }

    #[test]
    fn test_monthly() {
        // NPS Collector: 9:00 on the first of the month
        let schedule = CronSchedule::parse("0 9 1 * *").unwrap();
        let next = schedule.next_after(at(2026, 2, 10, 12, 0, 0)).unwrap();
        assert_eq!(next, at(2026, 3, 1, 9, 0, 0));
    }

    #[test]
    fn test_comma_list() {
        let schedule = CronSchedule::parse("0,15,30,45 * * * *").unwrap();
        let next = schedule.next_after(at(2026, 2, 22, 10, 31, 0)).unwrap();
        assert_eq!(next, at(2026, 2, 22, 10, 45, 0));
    }

    #[test]
    fn test_sunday_both_spellings() {
        // 2026-02-22 is a Sunday
        for expr in ["0 4 * * 0", "0 4 * * 7"] {
            let schedule = CronSchedule::parse(expr).unwrap();
            let next = schedule.next_after(at(2026, 2, 21, 12, 0, 0)).unwrap();
            assert_eq!(next, at(2026, 2, 22, 4, 0, 0), "expr {expr}");
        }
    }

    #[test]
    fn test_dom_dow_either_match() {
        // Both restricted: fires on the 15th OR on Mondays
        let schedule = CronSchedule::parse("0 9 15 * 1").unwrap();
        // 2026-02-13 is a Friday; next Monday is the 16th, but the 15th comes first
        let next = schedule.next_after(at(2026, 2, 13, 12, 0, 0)).unwrap();
        assert_eq!(next, at(2026, 2, 15, 9, 0, 0));
        let next = schedule.next_after(next).unwrap();
        assert_eq!(next, at(2026, 2, 16, 9, 0, 0));
    }

    #[test]
    fn test_trailing_seconds_field() {
        let schedule = CronSchedule::parse("* * * * * 0,30").unwrap();
        let next = schedule.next_after(at(2026, 2, 22, 10, 0, 10)).unwrap();
        assert_eq!(next, at(2026, 2, 22, 10, 0, 30));
        let next = schedule.next_after(next).unwrap();
        assert_eq!(next, at(2026, 2, 22, 10, 1, 0));
    }

    #[test]
    fn test_invalid_expressions() {
        for expr in [
            "bad",
            "* * * *",
            "* * * * * * *",
            "61 * * * *",
            "* 24 * * *",
            "*/0 * * * *",
            "10-5 * * * *",
            "a-b * * * *",
            "* * 0 * *",
        ] {
            let err = CronSchedule::parse(expr).unwrap_err();
            assert!(
                matches!(err, LeadLoopError::Schedule(_)),
                "expr '{expr}' should fail to parse"
            );
        }
    }

    #[test]
    fn test_due_basic() {
        let schedule = CronSchedule::parse("*/30 * * * *").unwrap();
        let now = at(2026, 2, 22, 10, 1, 0);
        // Last ran 31 minutes ago — the 10:00 slot was crossed
        assert!(schedule.due(now, at(2026, 2, 22, 9, 30, 0)));
        // Just ran — next slot (10:30) not crossed yet
        assert!(!schedule.due(at(2026, 2, 22, 10, 2, 0), now));
    }

    #[test]
    fn test_due_collapses_missed_slots() {
        // Scheduler was down for three hours; an every-15-min schedule is
        // due, and firing once resets it
        let schedule = CronSchedule::parse("*/15 * * * *").unwrap();
        let since = at(2026, 2, 22, 6, 0, 0);
        let now = at(2026, 2, 22, 9, 1, 0);
        assert!(schedule.due(now, since));
        // After one dispatch at `now`, no further fire until 9:15
        assert!(!schedule.due(at(2026, 2, 22, 9, 5, 0), now));
        assert!(schedule.due(at(2026, 2, 22, 9, 15, 0), now));
    }

    #[test]
    fn test_due_idempotent_within_slot() {
        // Fine-grained polling must not re-fire within one scheduled minute
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        let fired_at = at(2026, 2, 22, 10, 0, 5);
        assert!(!schedule.due(at(2026, 2, 22, 10, 0, 35), fired_at));
        assert!(schedule.due(at(2026, 2, 22, 10, 1, 0), fired_at));
    }
}
