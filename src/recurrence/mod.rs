//! Recurrence rules and next-occurrence arithmetic.
//!
//! Everything here is pure: callers pass the current occurrence and `now`, and get
//! back the first occurrence strictly after both. Stale occurrences are skipped in
//! constant time per call (whole periods are jumped arithmetically), so a reminder
//! that has not fired for years still advances in a handful of steps.
//!
//! Month arithmetic is anchored on the original occurrence: the k-th monthly
//! successor of `current` is `current + k months`, clamped to the last day of the
//! target month when the day does not exist there. Jan 31 therefore advances to
//! Feb 29 (2024) and then, from the same anchor, to Mar 31.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum RecurrencePattern {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurrencePattern {
    pub fn as_str(self) -> &'static str {
        match self {
            RecurrencePattern::None => "none",
            RecurrencePattern::Daily => "daily",
            RecurrencePattern::Weekly => "weekly",
            RecurrencePattern::Monthly => "monthly",
            RecurrencePattern::Yearly => "yearly",
        }
    }

    pub fn is_none(self) -> bool {
        self == RecurrencePattern::None
    }
}

/// Unrecognized values collapse to `None`, so a malformed row completes instead of
/// looping forever.
impl FromStr for RecurrencePattern {
    type Err = ();

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "daily" => RecurrencePattern::Daily,
            "weekly" => RecurrencePattern::Weekly,
            "monthly" => RecurrencePattern::Monthly,
            "yearly" => RecurrencePattern::Yearly,
            _ => RecurrencePattern::None,
        })
    }
}

impl From<String> for RecurrencePattern {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl fmt::Display for RecurrencePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional refinements stored next to the pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceData {
    /// Every `interval` periods. Missing or zero means 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    /// Weekly only. 0 = Sunday .. 6 = Saturday.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<u8>,
    /// Monthly only. Preferred day, clamped to the month length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
    /// Accepted for compatibility with stored rows; not used by the calculator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month_of_year: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub pattern: RecurrencePattern,
    pub data: RecurrenceData,
}

impl From<RecurrencePattern> for RecurrenceRule {
    fn from(pattern: RecurrencePattern) -> Self {
        Self {
            pattern,
            data: RecurrenceData::default(),
        }
    }
}

impl RecurrenceRule {
    pub fn new(pattern: RecurrencePattern, data: Option<RecurrenceData>) -> Self {
        Self {
            pattern,
            data: data.unwrap_or_default(),
        }
    }

    fn interval(&self) -> u32 {
        self.data.interval.unwrap_or(1).max(1)
    }

    /// First occurrence strictly after both `current` and `now`, or `None` when the
    /// rule does not repeat (or the result would leave chrono's representable range).
    pub fn next_after(&self, current: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let interval = self.interval();
        match self.pattern {
            RecurrencePattern::None => None,
            RecurrencePattern::Daily => {
                step_fixed(current, TimeDelta::try_days(i64::from(interval))?, now)
            }
            RecurrencePattern::Weekly => {
                let weekdays = valid_weekdays(&self.data.days_of_week);
                if weekdays.is_empty() {
                    step_fixed(current, TimeDelta::try_weeks(i64::from(interval))?, now)
                } else {
                    next_listed_weekday(current, &weekdays, now)
                }
            }
            RecurrencePattern::Monthly => {
                step_months(current, interval, self.data.day_of_month, now)
            }
            RecurrencePattern::Yearly => step_months(current, interval.checked_mul(12)?, None, now),
        }
    }
}

/// `next_occurrence(current, pattern, now)` with no refinements.
pub fn next_occurrence(
    current: DateTime<Utc>,
    pattern: RecurrencePattern,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    RecurrenceRule::from(pattern).next_after(current, now)
}

fn step_fixed(current: DateTime<Utc>, step: TimeDelta, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let step_ms = step.num_milliseconds();
    if step_ms <= 0 {
        return None;
    }
    let first = current.checked_add_signed(step)?;
    if first > now {
        return Some(first);
    }

    let behind_ms = (now - first).num_milliseconds();
    let periods = i32::try_from(behind_ms / step_ms + 1).ok()?;
    let mut candidate = first.checked_add_signed(step.checked_mul(periods)?)?;
    while candidate <= now {
        candidate = candidate.checked_add_signed(step)?;
    }
    Some(candidate)
}

fn step_months(
    current: DateTime<Utc>,
    interval: u32,
    day_of_month: Option<u32>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let anchor_day = day_of_month.unwrap_or_else(|| current.day()).clamp(1, 31);
    let months_apart = (now.year() - current.year()) * 12 + now.month() as i32
        - current.month() as i32;

    // Steps that land in an earlier month than `now` can never qualify, so start
    // from the last one that could.
    let mut steps = if months_apart > 0 {
        (months_apart as u32 / interval).max(1)
    } else {
        1
    };
    loop {
        let candidate = shift_months(current, steps.checked_mul(interval)?, anchor_day)?;
        if candidate > now && candidate > current {
            return Some(candidate);
        }
        steps = steps.checked_add(1)?;
    }
}

fn shift_months(current: DateTime<Utc>, months: u32, day: u32) -> Option<DateTime<Utc>> {
    let first_of_month = current
        .with_day(1)?
        .checked_add_months(Months::new(months))?;
    let last_day = days_in_month(first_of_month.year(), first_of_month.month());
    first_of_month.with_day(day.min(last_day))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

fn valid_weekdays(days: &[u8]) -> Vec<u32> {
    let mut weekdays: Vec<u32> = days
        .iter()
        .filter(|day| **day <= 6)
        .map(|day| u32::from(*day))
        .collect();
    weekdays.sort_unstable();
    weekdays.dedup();
    weekdays
}

fn next_listed_weekday(
    current: DateTime<Utc>,
    weekdays: &[u32],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let floor = current.max(now);
    let days_to_floor = (floor.date_naive() - current.date_naive()).num_days();
    let mut candidate = current.checked_add_signed(TimeDelta::try_days(days_to_floor)?)?;
    // A full week plus the floor day covers every weekday once.
    for _ in 0..8 {
        if candidate > floor && weekdays.contains(&candidate.weekday().num_days_from_sunday()) {
            return Some(candidate);
        }
        candidate = candidate.checked_add_signed(TimeDelta::days(1))?;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn daily_skips_to_first_slot_after_now_keeping_time_of_day() {
        let next = next_occurrence(
            ts("2024-01-01T07:00:00Z"),
            RecurrencePattern::Daily,
            ts("2024-03-15T06:00:00Z"),
        );
        assert_eq!(next, Some(ts("2024-03-15T07:00:00Z")));
    }

    #[test]
    fn monthly_from_the_31st_clamps_to_end_of_february() {
        let next = next_occurrence(
            ts("2024-01-31T09:00:00Z"),
            RecurrencePattern::Monthly,
            ts("2024-02-20T00:00:00Z"),
        );
        assert_eq!(next, Some(ts("2024-02-29T09:00:00Z")));
    }

    #[test]
    fn monthly_anchor_recovers_the_day_after_a_short_month() {
        let next = next_occurrence(
            ts("2024-01-31T09:00:00Z"),
            RecurrencePattern::Monthly,
            ts("2024-03-01T00:00:00Z"),
        );
        assert_eq!(next, Some(ts("2024-03-31T09:00:00Z")));
    }

    #[test]
    fn year_stale_daily_reminder_lands_on_the_next_day_not_one_period_later() {
        let current = ts("2023-03-10T08:30:00Z");
        let now = ts("2024-03-10T12:00:00Z");
        let next = next_occurrence(current, RecurrencePattern::Daily, now).unwrap();
        assert_eq!(next, ts("2024-03-11T08:30:00Z"));
        assert_ne!(next, current + TimeDelta::days(1));
    }

    #[test]
    fn very_stale_reminders_still_terminate() {
        let current = ts("1970-01-01T00:00:00Z");
        let now = ts("2024-06-01T00:00:00Z");
        for pattern in [
            RecurrencePattern::Daily,
            RecurrencePattern::Weekly,
            RecurrencePattern::Monthly,
            RecurrencePattern::Yearly,
        ] {
            let next = next_occurrence(current, pattern, now).expect("next occurrence");
            assert!(next > now, "{pattern} produced {next}");
        }
    }

    #[test]
    fn next_is_strictly_after_current_and_now() {
        let currents = [
            ts("2024-01-31T23:59:59Z"),
            ts("2024-02-29T12:00:00Z"),
            ts("2024-03-15T07:00:00Z"),
        ];
        let nows = [
            ts("2024-01-01T00:00:00Z"),
            ts("2024-03-15T07:00:00Z"),
            ts("2025-12-31T23:59:59Z"),
        ];
        for pattern in [
            RecurrencePattern::Daily,
            RecurrencePattern::Weekly,
            RecurrencePattern::Monthly,
            RecurrencePattern::Yearly,
        ] {
            for current in currents {
                for now in nows {
                    let next = next_occurrence(current, pattern, now).unwrap();
                    assert!(next > current, "{pattern}: {next} <= current {current}");
                    assert!(next > now, "{pattern}: {next} <= now {now}");
                }
            }
        }
    }

    #[test]
    fn future_occurrence_still_moves_one_period() {
        let current = ts("2024-03-15T07:00:00Z");
        let now = ts("2024-03-15T06:58:00Z");
        assert_eq!(
            next_occurrence(current, RecurrencePattern::Weekly, now),
            Some(ts("2024-03-22T07:00:00Z"))
        );
    }

    #[test]
    fn none_has_no_successor() {
        assert_eq!(
            next_occurrence(
                ts("2024-03-15T07:00:00Z"),
                RecurrencePattern::None,
                ts("2024-03-15T08:00:00Z")
            ),
            None
        );
    }

    #[test]
    fn yearly_leap_day_clamps_then_returns_in_leap_years() {
        let current = ts("2024-02-29T10:00:00Z");
        assert_eq!(
            next_occurrence(current, RecurrencePattern::Yearly, ts("2024-03-01T00:00:00Z")),
            Some(ts("2025-02-28T10:00:00Z"))
        );
        assert_eq!(
            next_occurrence(current, RecurrencePattern::Yearly, ts("2027-03-01T00:00:00Z")),
            Some(ts("2028-02-29T10:00:00Z"))
        );
    }

    #[test]
    fn unknown_pattern_strings_parse_as_none() {
        assert_eq!("Weekly".parse::<RecurrencePattern>(), Ok(RecurrencePattern::Weekly));
        assert_eq!(" daily ".parse::<RecurrencePattern>(), Ok(RecurrencePattern::Daily));
        assert_eq!("fortnightly".parse::<RecurrencePattern>(), Ok(RecurrencePattern::None));
        assert_eq!("".parse::<RecurrencePattern>(), Ok(RecurrencePattern::None));

        let parsed: RecurrencePattern = serde_json::from_str("\"hourly\"").unwrap();
        assert_eq!(parsed, RecurrencePattern::None);
        assert_eq!(
            serde_json::to_string(&RecurrencePattern::Monthly).unwrap(),
            "\"monthly\""
        );
    }

    #[test]
    fn interval_multiplies_the_period() {
        let rule = RecurrenceRule::new(
            RecurrencePattern::Daily,
            Some(RecurrenceData {
                interval: Some(3),
                ..RecurrenceData::default()
            }),
        );
        assert_eq!(
            rule.next_after(ts("2024-03-01T08:00:00Z"), ts("2024-03-05T09:00:00Z")),
            Some(ts("2024-03-07T08:00:00Z"))
        );

        let zero = RecurrenceRule::new(
            RecurrencePattern::Weekly,
            Some(RecurrenceData {
                interval: Some(0),
                ..RecurrenceData::default()
            }),
        );
        assert_eq!(
            zero.next_after(ts("2024-03-01T08:00:00Z"), ts("2024-03-01T09:00:00Z")),
            Some(ts("2024-03-08T08:00:00Z"))
        );
    }

    #[test]
    fn every_second_month_counts_from_the_anchor() {
        let rule = RecurrenceRule::new(
            RecurrencePattern::Monthly,
            Some(RecurrenceData {
                interval: Some(2),
                ..RecurrenceData::default()
            }),
        );
        assert_eq!(
            rule.next_after(ts("2024-01-15T09:00:00Z"), ts("2024-04-20T00:00:00Z")),
            Some(ts("2024-05-15T09:00:00Z"))
        );
    }

    #[test]
    fn day_of_month_stops_clamp_drift() {
        let rule = RecurrenceRule::new(
            RecurrencePattern::Monthly,
            Some(RecurrenceData {
                day_of_month: Some(31),
                ..RecurrenceData::default()
            }),
        );
        // Already clamped to the 29th; the preferred day brings it back to the 31st.
        assert_eq!(
            rule.next_after(ts("2024-02-29T09:00:00Z"), ts("2024-03-01T00:00:00Z")),
            Some(ts("2024-03-31T09:00:00Z"))
        );
        assert_eq!(
            rule.next_after(ts("2024-03-31T09:00:00Z"), ts("2024-04-01T00:00:00Z")),
            Some(ts("2024-04-30T09:00:00Z"))
        );
    }

    #[test]
    fn weekly_days_of_week_pick_the_next_listed_day() {
        // 2024-03-15 is a Friday.
        let rule = RecurrenceRule::new(
            RecurrencePattern::Weekly,
            Some(RecurrenceData {
                days_of_week: vec![1, 3],
                ..RecurrenceData::default()
            }),
        );
        assert_eq!(
            rule.next_after(ts("2024-03-15T07:00:00Z"), ts("2024-03-15T07:00:00Z")),
            Some(ts("2024-03-18T07:00:00Z"))
        );
        assert_eq!(
            rule.next_after(ts("2024-03-18T07:00:00Z"), ts("2024-03-18T07:05:00Z")),
            Some(ts("2024-03-20T07:00:00Z"))
        );
        // Stale by a month: first listed day after now, at the original time.
        assert_eq!(
            rule.next_after(ts("2024-02-12T07:00:00Z"), ts("2024-03-18T06:00:00Z")),
            Some(ts("2024-03-18T07:00:00Z"))
        );
    }

    #[test]
    fn invalid_weekdays_fall_back_to_plain_weekly() {
        let rule = RecurrenceRule::new(
            RecurrencePattern::Weekly,
            Some(RecurrenceData {
                days_of_week: vec![9],
                ..RecurrenceData::default()
            }),
        );
        assert_eq!(
            rule.next_after(ts("2024-03-15T07:00:00Z"), ts("2024-03-15T08:00:00Z")),
            Some(ts("2024-03-22T07:00:00Z"))
        );
    }

    #[test]
    fn recurrence_data_reads_stored_json_shape() {
        let data: RecurrenceData =
            serde_json::from_str(r#"{"interval":2,"days_of_week":[0,6],"month_of_year":4}"#)
                .unwrap();
        assert_eq!(data.interval, Some(2));
        assert_eq!(data.days_of_week, vec![0, 6]);
        assert_eq!(data.day_of_month, None);
    }
}
