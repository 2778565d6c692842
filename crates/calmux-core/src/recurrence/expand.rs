//! Occurrence expansion.
//!
//! [`OccurrenceDates`] walks a pattern's series from its anchor, one start
//! time per step; [`expand`] clips that walk to a query window and turns the
//! surviving dates into [`CalendarEvent`] occurrences.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, trace, warn};

use super::{LAST_WEEK, RecurrenceKind, RecurrencePattern};
use crate::event::CalendarEvent;
use crate::time::{TimeWindow, clamped_date, days_in_month, shift_month, weekday_index};

/// Cap applied when callers do not pick one.
pub const DEFAULT_MAX_OCCURRENCES: usize = 100;

/// Upper bound on series steps walked per expansion, including the ones
/// skipped before the window opens.
const MAX_STEPS: usize = 100_000;

/// The series of occurrence start times of a pattern, from its anchor.
///
/// Yields `(index, start)` pairs where `index` counts from the anchor (the
/// anchor itself is index 0). The iterator honours `end_date` and
/// `occurrence_count` but knows nothing about query windows. It is `Clone`,
/// so a walk can be restarted from any point.
#[derive(Debug, Clone)]
pub struct OccurrenceDates<'a> {
    pattern: &'a RecurrencePattern,
    anchor: NaiveDateTime,
    cursor: Option<NaiveDateTime>,
    index: usize,
}

impl<'a> OccurrenceDates<'a> {
    /// Starts a walk at `anchor`, the base event's start.
    pub fn new(pattern: &'a RecurrencePattern, anchor: DateTime<Utc>) -> Self {
        let anchor = anchor.naive_utc();
        Self {
            pattern,
            anchor,
            cursor: Some(anchor),
            index: 0,
        }
    }
}

impl Iterator for OccurrenceDates<'_> {
    type Item = (usize, DateTime<Utc>);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor?;

        if let Some(count) = self.pattern.occurrence_count
            && self.index >= count as usize
        {
            self.cursor = None;
            return None;
        }

        let start = current.and_utc();
        if let Some(end) = self.pattern.end_date
            && start >= end
        {
            self.cursor = None;
            return None;
        }

        let index = self.index;
        self.index += 1;
        self.cursor = next_after(self.pattern, self.anchor, current);
        Some((index, start))
    }
}

/// Expands `base` into the occurrences of `pattern` that start inside `window`.
///
/// Occurrences before `window.start` are skipped, generation stops at
/// `window.end`, at the pattern's own end, or once `max_occurrences`
/// occurrences have been produced.
pub fn expand(
    base: &CalendarEvent,
    pattern: &RecurrencePattern,
    window: &TimeWindow,
    max_occurrences: usize,
) -> Vec<CalendarEvent> {
    let walk = walk_window(base, pattern, window, max_occurrences, MAX_STEPS);
    if walk.out_of_steps {
        warn!(
            event_id = %base.id,
            steps = MAX_STEPS,
            kept = walk.occurrences.len(),
            window_start = %window.start,
            "Series walk hit the step limit before the window closed"
        );
    }
    walk.occurrences
}

struct Walk {
    occurrences: Vec<CalendarEvent>,
    /// The step budget ran out while the series could still reach the window.
    out_of_steps: bool,
}

fn walk_window(
    base: &CalendarEvent,
    pattern: &RecurrencePattern,
    window: &TimeWindow,
    max_occurrences: usize,
    max_steps: usize,
) -> Walk {
    let mut occurrences = Vec::new();
    if max_occurrences == 0 || window.is_empty() {
        return Walk {
            occurrences,
            out_of_steps: false,
        };
    }

    let mut dates = OccurrenceDates::new(pattern, base.start);
    let mut steps = 0;
    loop {
        if steps == max_steps {
            return Walk {
                occurrences,
                out_of_steps: true,
            };
        }
        let Some((n, start)) = dates.next() else {
            break;
        };
        steps += 1;

        if start >= window.end {
            break;
        }
        if start < window.start {
            trace!(event_id = %base.id, n, "Skipping occurrence before window");
            continue;
        }
        occurrences.push(base.occurrence(n, start));
        if occurrences.len() >= max_occurrences {
            debug!(
                event_id = %base.id,
                cap = max_occurrences,
                "Occurrence cap reached"
            );
            break;
        }
    }

    Walk {
        occurrences,
        out_of_steps: false,
    }
}

/// Computes the occurrence that follows `current`, keeping its time of day.
///
/// Returns `None` when the series cannot advance (date overflow or a
/// relative rule with no matching day), which ends the walk.
fn next_after(
    pattern: &RecurrencePattern,
    anchor: NaiveDateTime,
    current: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let date = current.date();
    let interval = pattern.interval.max(1);

    let next_date = match pattern.kind {
        RecurrenceKind::Daily | RecurrenceKind::Custom => {
            date.checked_add_signed(Duration::days(i64::from(interval)))?
        }
        RecurrenceKind::Weekly => next_weekly(date, interval, &pattern.days_of_week)?,
        RecurrenceKind::Monthly => {
            let (year, month) = shift_month(date.year(), date.month(), interval);
            day_in_month(pattern, anchor.date(), year, month)?
        }
        RecurrenceKind::Yearly => {
            let year = date.year().checked_add(i32::try_from(interval).ok()?)?;
            let month = pattern.month_of_year.unwrap_or(date.month());
            day_in_month(pattern, anchor.date(), year, month)?
        }
        RecurrenceKind::Weekdays => {
            let mut next = date.succ_opt()?;
            while matches!(weekday_index(next), 0 | 6) {
                next = next.succ_opt()?;
            }
            next
        }
    };

    let next = NaiveDateTime::new(next_date, current.time());
    // Every rule moves strictly forward; anything else would loop forever.
    (next > current).then_some(next)
}

/// Weekly stepping.
///
/// Moves to the next listed weekday later in the same week if there is one,
/// otherwise jumps `interval` weeks ahead and lands on the lowest listed
/// weekday. Without listed weekdays, adds `interval` weeks.
fn next_weekly(date: NaiveDate, interval: u32, days: &BTreeSet<u8>) -> Option<NaiveDate> {
    let weeks = i64::from(interval) * 7;
    let Some(&lowest) = days.first() else {
        return date.checked_add_signed(Duration::days(weeks));
    };

    let today = weekday_index(date);
    let offset = match days.iter().find(|d| **d > today) {
        Some(&later) => i64::from(later - today),
        None => weeks - i64::from(today - lowest),
    };
    date.checked_add_signed(Duration::days(offset))
}

/// Resolves the target day inside `(year, month)` for monthly/yearly rules.
///
/// A relative rule (`week_of_month` with weekdays) picks the n-th or last
/// matching day; otherwise the pattern's day of month (or the anchor's day)
/// is used, clamped to the month's length.
fn day_in_month(
    pattern: &RecurrencePattern,
    anchor: NaiveDate,
    year: i32,
    month: u32,
) -> Option<NaiveDate> {
    if let Some(week) = pattern.week_of_month
        && !pattern.days_of_week.is_empty()
    {
        return nth_matching_day(year, month, week, &pattern.days_of_week);
    }
    let day = pattern.day_of_month.unwrap_or(anchor.day());
    clamped_date(year, month, day)
}

/// Finds the `week`-th day of the month whose weekday is in `days`
/// (`LAST_WEEK` picks the last such day).
fn nth_matching_day(year: i32, month: u32, week: i8, days: &BTreeSet<u8>) -> Option<NaiveDate> {
    let length = days_in_month(year, month)?;
    let mut matching = (1..=length)
        .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
        .filter(|date| days.contains(&weekday_index(*date)));

    if week == LAST_WEEK {
        matching.last()
    } else {
        let nth = usize::try_from(week).ok()?.checked_sub(1)?;
        matching.nth(nth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn base_at(start: DateTime<Utc>) -> CalendarEvent {
        CalendarEvent::new("list_team_42", "Review", start, start + Duration::minutes(45), "list_team")
            .with_recurring(true)
    }

    fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> TimeWindow {
        TimeWindow::new(start, end).unwrap()
    }

    fn dates(events: &[CalendarEvent]) -> String {
        events
            .iter()
            .map(|e| e.start.format("%Y-%m-%d %a").to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    mod stepping {
        use super::*;

        #[test]
        fn daily_adds_interval_days() {
            let base = base_at(utc(2025, 3, 1, 9));
            let pattern = RecurrencePattern::daily(3);
            let out = expand(&base, &pattern, &window(utc(2025, 3, 1, 0), utc(2025, 3, 11, 0)), 100);
            let days: Vec<u32> = out.iter().map(|e| e.start.day()).collect();
            assert_eq!(days, [1, 4, 7, 10]);
        }

        #[test]
        fn weekly_mon_wed_fri_over_two_weeks() {
            // 2025-03-03 is a Monday.
            let base = base_at(utc(2025, 3, 3, 9));
            let pattern = RecurrencePattern::weekly(1, [1, 3, 5]);
            let out = expand(&base, &pattern, &window(utc(2025, 3, 3, 0), utc(2025, 3, 17, 0)), 100);

            assert_eq!(out.len(), 6);
            for event in &out {
                assert!(matches!(
                    event.start.weekday(),
                    Weekday::Mon | Weekday::Wed | Weekday::Fri
                ));
            }
        }

        #[test]
        fn weekly_interval_skips_whole_weeks() {
            let base = base_at(utc(2025, 3, 4, 9)); // Tuesday
            let pattern = RecurrencePattern::weekly(2, [2, 4]);
            let out = expand(&base, &pattern, &window(utc(2025, 3, 1, 0), utc(2025, 4, 1, 0)), 100);
            insta::assert_snapshot!(dates(&out), @r"
            2025-03-04 Tue
            2025-03-06 Thu
            2025-03-18 Tue
            2025-03-20 Thu
            ");
        }

        #[test]
        fn weekly_without_days_adds_weeks() {
            let base = base_at(utc(2025, 3, 5, 9));
            let pattern = RecurrencePattern::weekly(1, []);
            let out = expand(&base, &pattern, &window(utc(2025, 3, 1, 0), utc(2025, 3, 25, 0)), 100);
            let days: Vec<u32> = out.iter().map(|e| e.start.day()).collect();
            assert_eq!(days, [5, 12, 19]);
        }

        #[test]
        fn monthly_day_31_clamps_to_end_of_february() {
            let base = base_at(utc(2025, 1, 31, 10));
            let pattern = RecurrencePattern::monthly_on_day(1, 31);
            let out = expand(&base, &pattern, &window(utc(2025, 1, 1, 0), utc(2025, 5, 1, 0)), 100);
            insta::assert_snapshot!(dates(&out), @r"
            2025-01-31 Fri
            2025-02-28 Fri
            2025-03-31 Mon
            2025-04-30 Wed
            ");
        }

        #[test]
        fn monthly_clamps_to_leap_day() {
            let base = base_at(utc(2024, 1, 31, 10));
            let pattern = RecurrencePattern::monthly_on_day(1, 31);
            let out = expand(&base, &pattern, &window(utc(2024, 2, 1, 0), utc(2024, 3, 1, 0)), 100);
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].start, utc(2024, 2, 29, 10));
        }

        #[test]
        fn monthly_third_tuesday() {
            let base = base_at(utc(2025, 1, 21, 14)); // third Tuesday of January
            let pattern = RecurrencePattern::monthly_on_weekday(1, 3, [2]);
            let out = expand(&base, &pattern, &window(utc(2025, 1, 1, 0), utc(2025, 4, 1, 0)), 100);
            insta::assert_snapshot!(dates(&out), @r"
            2025-01-21 Tue
            2025-02-18 Tue
            2025-03-18 Tue
            ");
        }

        #[test]
        fn monthly_last_friday() {
            let base = base_at(utc(2025, 1, 31, 16));
            let pattern = RecurrencePattern::monthly_on_weekday(1, LAST_WEEK, [5]);
            let out = expand(&base, &pattern, &window(utc(2025, 1, 1, 0), utc(2025, 4, 1, 0)), 100);
            let days: Vec<u32> = out.iter().map(|e| e.start.day()).collect();
            assert_eq!(days, [31, 28, 28]);
        }

        #[test]
        fn yearly_overrides_month_and_day() {
            let base = base_at(utc(2024, 2, 29, 8));
            let pattern = RecurrencePattern::yearly_on(1, 2, 29);
            let out = expand(&base, &pattern, &window(utc(2024, 1, 1, 0), utc(2029, 1, 1, 0)), 100);
            insta::assert_snapshot!(dates(&out), @r"
            2024-02-29 Thu
            2025-02-28 Fri
            2026-02-28 Sat
            2027-02-28 Sun
            2028-02-29 Tue
            ");
        }

        #[test]
        fn weekdays_skip_weekends() {
            let base = base_at(utc(2025, 3, 6, 9)); // Thursday
            let pattern = RecurrencePattern::weekdays();
            let out = expand(&base, &pattern, &window(utc(2025, 3, 6, 0), utc(2025, 3, 12, 0)), 100);
            let days: Vec<u32> = out.iter().map(|e| e.start.day()).collect();
            assert_eq!(days, [6, 7, 10, 11]);
        }
    }

    mod bounds {
        use super::*;

        #[test]
        fn skips_occurrences_before_window() {
            let base = base_at(utc(2025, 1, 1, 9));
            let pattern = RecurrencePattern::daily(1);
            let out = expand(&base, &pattern, &window(utc(2025, 2, 1, 0), utc(2025, 2, 3, 0)), 100);

            assert_eq!(out.len(), 2);
            assert_eq!(out[0].start, utc(2025, 2, 1, 9));
            // Index counts from the anchor, not from the window.
            assert_eq!(out[0].id, "list_team_42_recur_31");
        }

        #[test]
        fn occurrences_stay_inside_window() {
            let patterns = [
                RecurrencePattern::daily(2),
                RecurrencePattern::weekly(1, [0, 6]),
                RecurrencePattern::monthly_on_day(1, 30),
                RecurrencePattern::monthly_on_weekday(2, 2, [3]),
                RecurrencePattern::yearly_on(1, 7, 4),
                RecurrencePattern::weekdays(),
            ];
            let windows = [
                window(utc(2025, 1, 15, 12), utc(2025, 3, 1, 0)),
                window(utc(2025, 6, 1, 9), utc(2025, 6, 1, 10)),
                window(utc(2024, 12, 31, 23), utc(2027, 1, 1, 0)),
            ];
            let base = base_at(utc(2025, 1, 1, 9));

            for pattern in &patterns {
                for w in &windows {
                    for event in expand(&base, pattern, w, 500) {
                        assert!(event.start >= w.start, "{pattern:?} leaked before {w:?}");
                        assert!(event.start < w.end, "{pattern:?} leaked after {w:?}");
                    }
                }
            }
        }

        #[test]
        fn end_date_is_exclusive() {
            let base = base_at(utc(2025, 3, 1, 9));
            let pattern = RecurrencePattern::daily(1).with_end_date(utc(2025, 3, 4, 9));
            let out = expand(&base, &pattern, &window(utc(2025, 3, 1, 0), utc(2025, 4, 1, 0)), 100);
            assert_eq!(out.len(), 3);
        }

        #[test]
        fn occurrence_count_counts_from_anchor() {
            let base = base_at(utc(2025, 3, 1, 9));
            let pattern = RecurrencePattern::daily(1).with_occurrence_count(5);
            let out = expand(&base, &pattern, &window(utc(2025, 3, 3, 0), utc(2025, 4, 1, 0)), 100);
            let days: Vec<u32> = out.iter().map(|e| e.start.day()).collect();
            assert_eq!(days, [3, 4, 5]);
        }

        #[test]
        fn cap_bounds_unbounded_patterns() {
            let base = base_at(utc(2025, 1, 1, 9));
            let pattern = RecurrencePattern::daily(1);
            let out = expand(
                &base,
                &pattern,
                &window(utc(2025, 1, 1, 0), utc(2030, 1, 1, 0)),
                DEFAULT_MAX_OCCURRENCES,
            );
            assert_eq!(out.len(), DEFAULT_MAX_OCCURRENCES);
        }

        #[test]
        fn anchor_centuries_back_runs_out_of_steps() {
            let base = base_at(utc(1700, 1, 1, 9));
            let pattern = RecurrencePattern::daily(1);
            let w = window(utc(2025, 1, 1, 0), utc(2025, 2, 1, 0));

            assert!(expand(&base, &pattern, &w, 100).is_empty());
            let walk = walk_window(&base, &pattern, &w, 100, MAX_STEPS);
            assert!(walk.out_of_steps);
            assert!(walk.occurrences.is_empty());
        }

        #[test]
        fn step_limit_is_not_reported_when_the_window_ends_the_walk() {
            let base = base_at(utc(2025, 1, 1, 9));
            let pattern = RecurrencePattern::daily(1);
            let w = window(utc(2025, 1, 1, 0), utc(2025, 1, 4, 0));

            let walk = walk_window(&base, &pattern, &w, 100, 4);
            assert!(!walk.out_of_steps);
            assert_eq!(walk.occurrences.len(), 3);

            let short = walk_window(&base, &pattern, &w, 100, 2);
            assert!(short.out_of_steps);
            assert_eq!(short.occurrences.len(), 2);
        }

        #[test]
        fn zero_cap_or_empty_window_yields_nothing() {
            let base = base_at(utc(2025, 1, 1, 9));
            let pattern = RecurrencePattern::daily(1);
            let w = window(utc(2025, 1, 1, 0), utc(2025, 2, 1, 0));
            assert!(expand(&base, &pattern, &w, 0).is_empty());
            let empty = window(utc(2025, 1, 5, 0), utc(2025, 1, 5, 0));
            assert!(expand(&base, &pattern, &empty, 10).is_empty());
        }

        #[test]
        fn zero_interval_still_advances() {
            let base = base_at(utc(2025, 1, 1, 9));
            let pattern = RecurrencePattern::daily(0);
            let out = expand(&base, &pattern, &window(utc(2025, 1, 1, 0), utc(2025, 1, 4, 0)), 100);
            assert_eq!(out.len(), 3);
        }
    }

    mod occurrences {
        use super::*;

        #[test]
        fn occurrences_keep_duration_and_link_master() {
            let base = base_at(utc(2025, 3, 3, 9));
            let pattern = RecurrencePattern::weekly(1, [1]);
            let out = expand(&base, &pattern, &window(utc(2025, 3, 1, 0), utc(2025, 3, 20, 0)), 100);

            assert_eq!(out.len(), 3);
            for (i, event) in out.iter().enumerate() {
                assert_eq!(event.id, format!("list_team_42_recur_{i}"));
                assert_eq!(event.duration(), Duration::minutes(45));
                assert_eq!(event.master_series_id.as_deref(), Some("list_team_42"));
                assert!(event.is_recurring);
            }
        }

        #[test]
        fn date_walk_is_restartable() {
            let pattern = RecurrencePattern::weekly(1, [1, 4]);
            let walk = OccurrenceDates::new(&pattern, utc(2025, 3, 3, 9));
            let first: Vec<_> = walk.clone().take(4).collect();
            let again: Vec<_> = walk.take(4).collect();
            assert_eq!(first, again);
        }
    }
}
