//! Time types for calendar queries.
//!
//! This module provides [`TimeWindow`] for defining half-open query ranges and
//! a handful of calendar arithmetic helpers shared by the recurrence expander
//! and the provider normalizers.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a window would end before it starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("time window start {start} is after end {end}")]
pub struct InvalidWindow {
    /// Requested start.
    pub start: DateTime<Utc>,
    /// Requested end.
    pub end: DateTime<Utc>,
}

/// A time window for querying calendar events.
///
/// Represents a half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidWindow`] if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, InvalidWindow> {
        if start > end {
            return Err(InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Creates a time window from a start time and duration.
    ///
    /// Negative durations collapse to an empty window at `start`.
    pub fn from_duration(start: DateTime<Utc>, duration: Duration) -> Self {
        let end = start + duration.max(Duration::zero());
        Self { start, end }
    }

    /// Creates a time window covering whole UTC days `[first, last]`.
    pub fn for_dates(first: NaiveDate, last: NaiveDate) -> Result<Self, InvalidWindow> {
        let start = midnight_utc(first);
        let end = midnight_utc(last) + Duration::days(1);
        Self::new(start, end)
    }

    /// Returns the duration of the window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Returns true if the window has zero length.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Checks if a datetime falls within this window.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        dt >= self.start && dt < self.end
    }

    /// Checks if the interval `[start, end)` overlaps this window.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && end > self.start
    }

    /// A compact, stable representation used in cache keys.
    pub fn cache_fragment(&self) -> String {
        format!(
            "{}-{}",
            self.start.timestamp_millis(),
            self.end.timestamp_millis()
        )
    }
}

/// Midnight UTC on the given date.
pub fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    NaiveDateTime::new(date, NaiveTime::MIN).and_utc()
}

/// Returns the number of days in the given month, or `None` for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    u32::try_from((next - first).num_days()).ok()
}

/// Builds a date, clamping `day` to the last day of the month when it overflows.
pub fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let last = days_in_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, day.clamp(1, last))
}

/// Moves `(year, month)` forward by `months` months.
pub fn shift_month(year: i32, month: u32, months: u32) -> (i32, u32) {
    let zero_based = i64::from(year) * 12 + i64::from(month) - 1 + i64::from(months);
    let year = zero_based.div_euclid(12);
    let month = zero_based.rem_euclid(12) + 1;
    (year as i32, month as u32)
}

/// Weekday index with Sunday = 0 .. Saturday = 6.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}
