//! Scheduling conflict detection.

use serde::Serialize;

use calmux_core::{CalendarEvent, TimeWindow};

/// Two timed events whose intervals overlap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventConflict {
    /// The earlier of the two in the scanned order.
    pub first: CalendarEvent,
    pub second: CalendarEvent,
    /// Whole minutes both events share.
    pub overlap_minutes: i64,
}

/// Conflicts found inside a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictReport {
    pub window: TimeWindow,
    pub conflicts: Vec<EventConflict>,
}

impl ConflictReport {
    /// Ids of every event that takes part in at least one conflict, in
    /// first-seen order.
    pub fn involved_event_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for conflict in &self.conflicts {
            for id in [conflict.first.id.as_str(), conflict.second.id.as_str()] {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    /// Returns true if nothing overlaps.
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Minutes shared by `a` and `b`, floored at zero.
pub fn overlap_minutes(a: &CalendarEvent, b: &CalendarEvent) -> i64 {
    let start = a.start.max(b.start);
    let end = a.end.min(b.end);
    (end - start).num_minutes().max(0)
}

/// Pairwise scan over timed events.
///
/// All-day events never conflict. Pairs are reported in input order.
pub fn find_conflicts(events: &[CalendarEvent]) -> Vec<EventConflict> {
    let timed: Vec<&CalendarEvent> = events.iter().filter(|e| !e.is_all_day).collect();
    let mut conflicts = Vec::new();

    for (i, first) in timed.iter().enumerate() {
        for second in &timed[i + 1..] {
            if first.overlaps(second.start, second.end) {
                conflicts.push(EventConflict {
                    first: (*first).clone(),
                    second: (*second).clone(),
                    overlap_minutes: overlap_minutes(first, second),
                });
            }
        }
    }

    conflicts
}
