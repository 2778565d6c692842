#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use calmux_core::{BackendKind, CalendarSource};
use calmux_engine::{CalendarEngine, EngineConfig};
use calmux_providers::{CalendarBackend, RawEvent, RawEventTime, RawSource, StaticBackend};

pub fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, minute, 0).unwrap()
}

pub fn timed(id: &str, source: &str, start: DateTime<Utc>, minutes: i64) -> RawEvent {
    RawEvent::new(
        id,
        source,
        RawEventTime::from_datetime(start),
        RawEventTime::from_datetime(start + Duration::minutes(minutes)),
    )
}

/// Three list-based calendars with a week of meetings.
pub fn list_backend() -> StaticBackend {
    StaticBackend::new(BackendKind::ListBased, "lists")
        .with_source(RawSource::new("team", "Team", "https://example.com/sites/team"))
        .with_source(RawSource::new("ops", "Ops", "https://example.com/sites/ops"))
        .with_source(RawSource::new("design", "Design", "https://example.com/sites/design"))
        .with_events([
            timed("p1", "team", utc(3, 9, 0), 60)
                .with_title("Planning")
                .with_organizer("ana@example.com"),
            timed("s1", "team", utc(4, 10, 0), 30)
                .with_title("Sync")
                .with_organizer("ana@example.com"),
            timed("h1", "ops", utc(3, 9, 30), 60).with_title("Oncall handover"),
            timed("c1", "design", utc(5, 14, 0), 45)
                .with_title("Design crit")
                .with_description("budget for the new kit"),
        ])
}

/// One mailbox calendar that repeats the "Sync" meeting.
pub fn mailbox_backend() -> StaticBackend {
    StaticBackend::new(BackendKind::MailboxBased, "mailbox")
        .with_source(RawSource::new("AAMk", "Calendar", "me"))
        .with_events([
            timed("m1", "AAMk", utc(4, 10, 0), 30)
                .with_title("Sync")
                .with_organizer("ana@example.com"),
            timed("m2", "AAMk", utc(3, 9, 45), 30).with_title("1:1"),
            timed("m3", "AAMk", utc(6, 16, 0), 30).with_title("Budget review"),
        ])
}

pub fn engine_with(config: EngineConfig, backends: Vec<Arc<dyn CalendarBackend>>) -> CalendarEngine {
    CalendarEngine::new(config, backends)
}

pub fn source(kind: BackendKind, native_id: &str, container: &str) -> CalendarSource {
    CalendarSource::new(kind, native_id, native_id, container)
}

pub fn team() -> CalendarSource {
    source(BackendKind::ListBased, "team", "https://example.com/sites/team")
}

pub fn ops() -> CalendarSource {
    source(BackendKind::ListBased, "ops", "https://example.com/sites/ops")
}

pub fn design() -> CalendarSource {
    source(BackendKind::ListBased, "design", "https://example.com/sites/design")
}

pub fn mailbox() -> CalendarSource {
    source(BackendKind::MailboxBased, "AAMk", "me")
}

pub fn week() -> (DateTime<Utc>, DateTime<Utc>) {
    (utc(3, 0, 0), utc(10, 0, 0))
}

/// Keeps a concrete handle for steering a backend while the engine gets
/// the trait object.
pub fn shared(backend: StaticBackend) -> (Arc<StaticBackend>, Arc<dyn CalendarBackend>) {
    let concrete = Arc::new(backend);
    let dynamic: Arc<dyn CalendarBackend> = concrete.clone();
    (concrete, dynamic)
}
