//! Core types: sources, events, time windows, recurrence expansion, tracing

pub mod event;
pub mod recurrence;
pub mod time;
pub mod tracing;

pub use event::{Attendee, BackendKind, CalendarEvent, CalendarSource, Importance};
pub use recurrence::{
    DEFAULT_MAX_OCCURRENCES, LAST_WEEK, OccurrenceDates, PatternError, RecurrenceKind,
    RecurrencePattern, expand,
};
pub use time::{InvalidWindow, TimeWindow, midnight_utc};
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
