//! Canonical recurrence patterns.
//!
//! Every backend dialect is normalized into a [`RecurrencePattern`] before
//! expansion. The pattern is a tagged variant: [`RecurrenceKind`] picks the
//! stepping rule, the optional fields refine it.
//!
//! | kind       | fields used                                                     |
//! |------------|-----------------------------------------------------------------|
//! | `Daily`    | `interval`                                                      |
//! | `Weekly`   | `interval`, `days_of_week`                                      |
//! | `Monthly`  | `interval`, `day_of_month` or `week_of_month` + `days_of_week`  |
//! | `Yearly`   | `interval`, `month_of_year`, `day_of_month` or `week_of_month`  |
//! | `Weekdays` | none (Monday to Friday)                                         |
//! | `Custom`   | `interval` (stepped in days)                                    |

mod expand;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use expand::{DEFAULT_MAX_OCCURRENCES, OccurrenceDates, expand};

/// Week-of-month value meaning "the last one in the month".
pub const LAST_WEEK: i8 = -1;

/// The stepping rule of a recurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Weekdays,
    Custom,
}

/// Validation failures of a canonical pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("interval must be at least 1")]
    ZeroInterval,

    #[error("day of week {0} is outside 0..=6")]
    InvalidWeekday(u8),

    #[error("day of month {0} is outside 1..=31")]
    InvalidDayOfMonth(u32),

    #[error("week of month {0} must be 1-4 or -1")]
    InvalidWeekOfMonth(i8),

    #[error("month {0} is outside 1..=12")]
    InvalidMonth(u32),

    #[error("end date and occurrence count are mutually exclusive")]
    ConflictingRange,
}

/// A backend-agnostic recurrence rule.
///
/// At most one of `end_date` / `occurrence_count` is set; when neither is,
/// the series is unbounded and callers must bound expansion with a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrencePattern {
    /// Stepping rule.
    pub kind: RecurrenceKind,
    /// Step size in units of the kind (days, weeks, months, years).
    pub interval: u32,
    /// Weekdays, Sunday = 0 .. Saturday = 6. Empty means unset.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub days_of_week: BTreeSet<u8>,
    /// Day of the month (1-31); short months clamp to their last day.
    pub day_of_month: Option<u32>,
    /// Week of the month (1-4, or [`LAST_WEEK`]).
    pub week_of_month: Option<i8>,
    /// Month of the year (1-12).
    pub month_of_year: Option<u32>,
    /// Exclusive bound: no occurrence starts at or after this instant.
    pub end_date: Option<DateTime<Utc>>,
    /// Total number of occurrences in the series, counted from the anchor.
    pub occurrence_count: Option<u32>,
}

impl RecurrencePattern {
    /// Creates an unbounded pattern of the given kind and interval.
    pub fn new(kind: RecurrenceKind, interval: u32) -> Self {
        Self {
            kind,
            interval,
            days_of_week: BTreeSet::new(),
            day_of_month: None,
            week_of_month: None,
            month_of_year: None,
            end_date: None,
            occurrence_count: None,
        }
    }

    /// Every `interval` days.
    pub fn daily(interval: u32) -> Self {
        Self::new(RecurrenceKind::Daily, interval)
    }

    /// Every `interval` weeks on the given weekdays.
    pub fn weekly(interval: u32, days: impl IntoIterator<Item = u8>) -> Self {
        Self {
            days_of_week: days.into_iter().collect(),
            ..Self::new(RecurrenceKind::Weekly, interval)
        }
    }

    /// Every `interval` months on a fixed day.
    pub fn monthly_on_day(interval: u32, day: u32) -> Self {
        Self {
            day_of_month: Some(day),
            ..Self::new(RecurrenceKind::Monthly, interval)
        }
    }

    /// Every `interval` months on the n-th (or last) matching weekday.
    pub fn monthly_on_weekday(interval: u32, week: i8, days: impl IntoIterator<Item = u8>) -> Self {
        Self {
            week_of_month: Some(week),
            days_of_week: days.into_iter().collect(),
            ..Self::new(RecurrenceKind::Monthly, interval)
        }
    }

    /// Every `interval` years on a fixed month and day.
    pub fn yearly_on(interval: u32, month: u32, day: u32) -> Self {
        Self {
            month_of_year: Some(month),
            day_of_month: Some(day),
            ..Self::new(RecurrenceKind::Yearly, interval)
        }
    }

    /// Every weekday (Monday to Friday).
    pub fn weekdays() -> Self {
        Self::new(RecurrenceKind::Weekdays, 1)
    }

    /// Builder method to end the series before `end`.
    pub fn with_end_date(mut self, end: DateTime<Utc>) -> Self {
        self.end_date = Some(end);
        self
    }

    /// Builder method to limit the series to `count` occurrences.
    pub fn with_occurrence_count(mut self, count: u32) -> Self {
        self.occurrence_count = Some(count);
        self
    }

    /// Builder method to set the month of the year.
    pub fn with_month(mut self, month: u32) -> Self {
        self.month_of_year = Some(month);
        self
    }

    /// Returns true if the series has neither an end date nor a count.
    pub fn is_unbounded(&self) -> bool {
        self.end_date.is_none() && self.occurrence_count.is_none()
    }

    /// Checks the field invariants.
    pub fn validate(&self) -> Result<(), PatternError> {
        if self.interval == 0 {
            return Err(PatternError::ZeroInterval);
        }
        if let Some(&day) = self.days_of_week.iter().find(|d| **d > 6) {
            return Err(PatternError::InvalidWeekday(day));
        }
        if let Some(day) = self.day_of_month
            && !(1..=31).contains(&day)
        {
            return Err(PatternError::InvalidDayOfMonth(day));
        }
        if let Some(week) = self.week_of_month
            && !matches!(week, 1..=4 | LAST_WEEK)
        {
            return Err(PatternError::InvalidWeekOfMonth(week));
        }
        if let Some(month) = self.month_of_year
            && !(1..=12).contains(&month)
        {
            return Err(PatternError::InvalidMonth(month));
        }
        if self.end_date.is_some() && self.occurrence_count.is_some() {
            return Err(PatternError::ConflictingRange);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn builders_set_kind_and_fields() {
        let weekly = RecurrencePattern::weekly(2, [5, 1, 3, 1]);
        assert_eq!(weekly.kind, RecurrenceKind::Weekly);
        assert_eq!(weekly.interval, 2);
        assert_eq!(weekly.days_of_week.iter().copied().collect::<Vec<_>>(), [1, 3, 5]);

        let relative = RecurrencePattern::monthly_on_weekday(1, LAST_WEEK, [5]);
        assert_eq!(relative.week_of_month, Some(-1));
        assert!(relative.is_unbounded());
    }

    #[test]
    fn valid_patterns_pass() {
        assert!(RecurrencePattern::daily(1).validate().is_ok());
        assert!(RecurrencePattern::yearly_on(1, 2, 29).validate().is_ok());
        assert!(
            RecurrencePattern::monthly_on_weekday(1, 3, [2])
                .with_occurrence_count(5)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn rejects_bad_fields() {
        assert_eq!(
            RecurrencePattern::daily(0).validate(),
            Err(PatternError::ZeroInterval)
        );
        assert_eq!(
            RecurrencePattern::weekly(1, [7]).validate(),
            Err(PatternError::InvalidWeekday(7))
        );
        assert_eq!(
            RecurrencePattern::monthly_on_day(1, 32).validate(),
            Err(PatternError::InvalidDayOfMonth(32))
        );
        assert_eq!(
            RecurrencePattern::monthly_on_weekday(1, 5, [1]).validate(),
            Err(PatternError::InvalidWeekOfMonth(5))
        );
        assert_eq!(
            RecurrencePattern::yearly_on(1, 13, 1).validate(),
            Err(PatternError::InvalidMonth(13))
        );
    }

    #[test]
    fn end_date_and_count_are_exclusive() {
        let pattern = RecurrencePattern::daily(1)
            .with_end_date(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap())
            .with_occurrence_count(3);
        assert_eq!(pattern.validate(), Err(PatternError::ConflictingRange));
    }

    #[test]
    fn serializes_without_empty_day_set() {
        let json = serde_json::to_value(RecurrencePattern::daily(2)).unwrap();
        assert_eq!(json["kind"], "daily");
        assert!(json.get("days_of_week").is_none());
    }
}
