//! RawEvent to CalendarEvent conversion pipeline.
//!
//! The normalization process:
//! 1. Drops cancelled records and records whose end precedes their start
//! 2. Synthesizes the global event id `<source id>_<native id>`
//! 3. Maps fields, falling back to the source color
//! 4. Expands series masters into occurrences when a window is given

use chrono::Duration;
use tracing::{debug, warn};

use calmux_core::{Attendee, CalendarEvent, CalendarSource, Importance, TimeWindow, expand};

use crate::raw::RawEvent;
use crate::recurrence::normalize_recurrence_lenient;

/// How far series masters are expanded.
#[derive(Debug, Clone, Copy)]
pub struct Expansion {
    /// Occurrences must start inside this window.
    pub window: TimeWindow,
    /// Per-series cap.
    pub max_occurrences: usize,
}

impl Expansion {
    /// Creates expansion options.
    pub fn new(window: TimeWindow, max_occurrences: usize) -> Self {
        Self {
            window,
            max_occurrences,
        }
    }
}

/// Converts a [`RawEvent`] into canonical events.
///
/// Returns an empty vector for dropped records, a single event for plain
/// records and series masters without `expansion`, and the occurrences in
/// the window otherwise. A series whose recurrence cannot be normalized is
/// kept as a single non-recurring event.
pub fn normalize_event(
    raw: &RawEvent,
    source: &CalendarSource,
    expansion: Option<&Expansion>,
) -> Vec<CalendarEvent> {
    if raw.is_cancelled() {
        debug!(event_id = %raw.id, source_id = %source.id, "Dropping cancelled event");
        return Vec::new();
    }

    let Some(base) = base_event(raw, source) else {
        return Vec::new();
    };

    let Some(recurrence) = &raw.recurrence else {
        return vec![base];
    };
    let Some(pattern) = normalize_recurrence_lenient(recurrence, &base.id) else {
        return vec![base];
    };

    let base = base.with_recurring(true);
    match expansion {
        Some(expansion) => expand(&base, &pattern, &expansion.window, expansion.max_occurrences),
        None => vec![base],
    }
}

/// Normalizes every record of one source.
pub fn normalize_events(
    raws: &[RawEvent],
    source: &CalendarSource,
    expansion: Option<&Expansion>,
) -> Vec<CalendarEvent> {
    raws.iter()
        .flat_map(|raw| normalize_event(raw, source, expansion))
        .collect()
}

fn base_event(raw: &RawEvent, source: &CalendarSource) -> Option<CalendarEvent> {
    let id = format!("{}_{}", source.id, raw.id);
    let start = raw.start.to_utc();
    let mut end = raw.end.to_utc();
    let all_day = raw.is_all_day();

    if all_day && end <= start {
        end = start + Duration::days(1);
    } else if end <= start {
        warn!(
            event_id = %id,
            start = %start,
            end = %end,
            "Dropping timed event that does not end after it starts"
        );
        return None;
    }

    let color = raw
        .color
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or(&source.color);

    let mut event = CalendarEvent::new(id, raw.effective_title(), start, end, &source.id)
        .with_all_day(all_day)
        .with_organizer(raw.effective_organizer())
        .with_color(color);

    if let Some(ref description) = raw.description {
        event = event.with_description(description);
    }

    if let Some(ref location) = raw.location
        && !location.trim().is_empty()
    {
        event = event.with_location(location);
    }

    if let Some(ref importance) = raw.importance {
        event = event.with_importance(Importance::parse_lenient(importance));
    }

    for attendee in &raw.attendees {
        let mut mapped = Attendee::new(&attendee.email);
        if let Some(ref name) = attendee.display_name {
            mapped = mapped.with_name(name);
        }
        event = event.with_attendee(mapped);
    }

    Some(event)
}
