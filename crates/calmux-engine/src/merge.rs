//! Merging per-source results into one answer.

use std::collections::HashSet;

use calmux_core::{CalendarEvent, CalendarSource};

/// Heuristic identity used to collapse the same meeting seen in two sources.
///
/// Distinct events sharing title, start and organizer collapse as well.
pub fn dedup_key(event: &CalendarEvent) -> String {
    format!(
        "{}|{}|{}",
        event.title,
        event.start.timestamp_millis(),
        event.organizer
    )
    .to_lowercase()
}

/// Keeps the first event of every [`dedup_key`] group, preserving order.
pub fn dedupe(events: Vec<CalendarEvent>) -> Vec<CalendarEvent> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|event| seen.insert(dedup_key(event)))
        .collect()
}

/// Stable ascending sort by start.
pub fn sort_by_start(events: &mut [CalendarEvent]) {
    events.sort_by_key(|event| event.start);
}

/// Orders search hits: title matches first, then by start within each group.
pub fn rank_search(events: &mut [CalendarEvent], query: &str) {
    let needle = query.trim().to_lowercase();
    events.sort_by_cached_key(|event| (!event.title.to_lowercase().contains(&needle), event.start));
}

/// Sort, dedupe and truncate a merged list.
pub fn finish(mut events: Vec<CalendarEvent>, max: usize) -> Vec<CalendarEvent> {
    sort_by_start(&mut events);
    let mut events = dedupe(events);
    events.truncate(max);
    events
}

/// How many events each of `source_count` sources may contribute.
pub fn per_source_limit(max: usize, source_count: usize) -> usize {
    max.div_ceil(source_count.max(1))
}

/// Drops repeated source references, keeping the first of each id.
pub fn unique_sources(sources: &[CalendarSource]) -> Vec<CalendarSource> {
    let mut seen = HashSet::new();
    sources
        .iter()
        .filter(|source| seen.insert(source.id.as_str()))
        .cloned()
        .collect()
}

/// Order-independent cache key fragment for a set of sources.
pub fn source_key(sources: &[CalendarSource]) -> String {
    let mut ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.join(",")
}
