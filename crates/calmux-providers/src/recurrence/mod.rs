//! Recurrence dialect normalization.
//!
//! Each backend family encodes recurrence differently:
//!
//! - list-based backends send an attribute-tagged XML rule
//!   (`<recurrence><rule><repeat><weekly mo="TRUE" weekFrequency="1"/></repeat>...`)
//! - mailbox-based backends send a JSON `{ pattern, range }` pair whose
//!   `type` fields discriminate the variants
//!
//! Both parse into the same [`RecurrencePattern`]. The dialects live in
//! their own pure parsing functions so the expander never sees them.

mod list_rule;
mod mailbox;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::warn;

use calmux_core::{LAST_WEEK, RecurrencePattern, midnight_utc};

use crate::error::NormalizationError;
use crate::raw::RawRecurrence;

/// Converts a backend recurrence payload into a validated canonical pattern.
///
/// # Errors
///
/// Returns [`NormalizationError`] when the payload is malformed, uses a
/// pattern type neither dialect knows, or yields an invalid pattern
/// (including one with both an end date and an occurrence count).
pub fn normalize_recurrence(raw: &RawRecurrence) -> Result<RecurrencePattern, NormalizationError> {
    let pattern = match raw {
        RawRecurrence::ListRule(xml) => list_rule::parse(xml)?,
        RawRecurrence::MailboxPattern(json) => mailbox::parse(json)?,
    };
    pattern.validate()?;
    Ok(pattern)
}

/// Like [`normalize_recurrence`], but logs failures and returns `None`.
///
/// One bad recurrence record must not void a whole calendar: callers treat
/// `None` as "not recurring".
pub fn normalize_recurrence_lenient(
    raw: &RawRecurrence,
    event_id: &str,
) -> Option<RecurrencePattern> {
    match normalize_recurrence(raw) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            warn!(
                event_id = %event_id,
                format = %raw.format(),
                error = %e,
                "Unusable recurrence, treating event as non-recurring"
            );
            None
        }
    }
}

/// Maps an ordinal token to a week-of-month value.
fn week_of_month(token: &str) -> Result<i8, NormalizationError> {
    match token.trim().to_ascii_lowercase().as_str() {
        "first" => Ok(1),
        "second" => Ok(2),
        "third" => Ok(3),
        "fourth" => Ok(4),
        "last" => Ok(LAST_WEEK),
        _ => Err(NormalizationError::invalid("week of month", token)),
    }
}

/// Turns an inclusive last day into the exclusive bound used by patterns.
fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    midnight_utc(date) + Duration::days(1)
}
