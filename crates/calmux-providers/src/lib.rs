//! CalendarBackend trait, raw records and recurrence normalization.
//!
//! - [`CalendarBackend`] - The trait each backend family implements
//! - [`RawSource`] / [`RawEvent`] - Records as a backend hands them over
//! - [`normalize_recurrence`] - Both recurrence dialects into one pattern
//! - [`normalize_event`] - Raw records into canonical, expanded events
//! - [`StaticBackend`] - In-memory backend with failure injection
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐    ┌──────────────────┐
//! │ list-based sites │    │ mailbox accounts │
//! └────────┬─────────┘    └────────┬─────────┘
//!          │   CalendarBackend     │
//!          └──────────┬────────────┘
//!                     ▼
//!          RawEvent + RawRecurrence (XML rule | JSON pattern)
//!                     │
//!                     ▼ normalize_event()
//!          CalendarEvent occurrences
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod normalize;
pub mod raw;
pub mod recurrence;

pub use backend::{BoxFuture, CalendarBackend, ErrorBackend, FetchOptions};
pub use error::{NormalizationError, ProviderError, ProviderErrorCode, ProviderResult};
pub use memory::{CallCounts, StaticBackend};
pub use normalize::{Expansion, normalize_event, normalize_events};
pub use raw::{RawAttendee, RawEvent, RawEventTime, RawRecurrence, RawSource};
pub use recurrence::{normalize_recurrence, normalize_recurrence_lenient};
