//! Structured JSON patterns of mailbox-based backends.
//!
//! A payload is a `{ "pattern": {...}, "range": {...} }` pair. Both halves
//! carry a `type` discriminator; the remaining camelCase fields depend on it.

use chrono::NaiveDate;
use serde::Deserialize;

use calmux_core::{RecurrenceKind, RecurrencePattern};

use super::{end_of_day, week_of_month};
use crate::error::NormalizationError;

#[derive(Debug, Deserialize)]
struct PatternedRecurrence {
    pattern: MailboxPattern,
    #[serde(default)]
    range: Option<MailboxRange>,
}

fn every_period() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum MailboxPattern {
    Daily {
        #[serde(default = "every_period")]
        interval: u32,
    },
    Weekly {
        #[serde(default = "every_period")]
        interval: u32,
        #[serde(default)]
        days_of_week: Vec<String>,
    },
    AbsoluteMonthly {
        #[serde(default = "every_period")]
        interval: u32,
        day_of_month: u32,
    },
    RelativeMonthly {
        #[serde(default = "every_period")]
        interval: u32,
        days_of_week: Vec<String>,
        #[serde(default)]
        index: Option<String>,
    },
    AbsoluteYearly {
        #[serde(default = "every_period")]
        interval: u32,
        day_of_month: u32,
        month: u32,
    },
    RelativeYearly {
        #[serde(default = "every_period")]
        interval: u32,
        days_of_week: Vec<String>,
        #[serde(default)]
        index: Option<String>,
        month: u32,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum MailboxRange {
    /// Runs through `end_date`, inclusive.
    EndDate { end_date: NaiveDate },
    NoEnd {},
    /// Zero occurrences is treated as unbounded.
    Numbered { number_of_occurrences: u32 },
}

/// Parses a mailbox-based `{ pattern, range }` payload.
pub(super) fn parse(value: &serde_json::Value) -> Result<RecurrencePattern, NormalizationError> {
    let recurrence = PatternedRecurrence::deserialize(value)?;

    let mut pattern = match recurrence.pattern {
        MailboxPattern::Daily { interval } => RecurrencePattern::daily(interval),
        MailboxPattern::Weekly {
            interval,
            days_of_week,
        } => {
            let days = weekdays(&days_of_week)?;
            if days.is_empty() {
                return Err(NormalizationError::invalid("daysOfWeek", ""));
            }
            RecurrencePattern::weekly(interval, days)
        }
        MailboxPattern::AbsoluteMonthly {
            interval,
            day_of_month,
        } => RecurrencePattern::monthly_on_day(interval, day_of_month),
        MailboxPattern::RelativeMonthly {
            interval,
            days_of_week,
            index,
        } => RecurrencePattern::monthly_on_weekday(
            interval,
            relative_index(index.as_deref())?,
            relative_days(&days_of_week)?,
        ),
        MailboxPattern::AbsoluteYearly {
            interval,
            day_of_month,
            month,
        } => RecurrencePattern::yearly_on(interval, month, day_of_month),
        MailboxPattern::RelativeYearly {
            interval,
            days_of_week,
            index,
            month,
        } => {
            let mut pattern = RecurrencePattern::monthly_on_weekday(
                interval,
                relative_index(index.as_deref())?,
                relative_days(&days_of_week)?,
            )
            .with_month(month);
            pattern.kind = RecurrenceKind::Yearly;
            pattern
        }
    };

    match recurrence.range {
        Some(MailboxRange::EndDate { end_date }) => pattern.end_date = Some(end_of_day(end_date)),
        Some(MailboxRange::Numbered {
            number_of_occurrences,
        }) if number_of_occurrences > 0 => {
            pattern.occurrence_count = Some(number_of_occurrences);
        }
        Some(MailboxRange::Numbered { .. } | MailboxRange::NoEnd {}) | None => {}
    }

    Ok(pattern)
}

fn weekday(name: &str) -> Result<u8, NormalizationError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "sunday" => Ok(0),
        "monday" => Ok(1),
        "tuesday" => Ok(2),
        "wednesday" => Ok(3),
        "thursday" => Ok(4),
        "friday" => Ok(5),
        "saturday" => Ok(6),
        _ => Err(NormalizationError::invalid("daysOfWeek", name)),
    }
}

fn weekdays(names: &[String]) -> Result<Vec<u8>, NormalizationError> {
    names.iter().map(|name| weekday(name)).collect()
}

fn relative_days(names: &[String]) -> Result<Vec<u8>, NormalizationError> {
    let days = weekdays(names)?;
    if days.is_empty() {
        return Err(NormalizationError::invalid("daysOfWeek", ""));
    }
    Ok(days)
}

fn relative_index(index: Option<&str>) -> Result<i8, NormalizationError> {
    week_of_month(index.unwrap_or("first"))
}
