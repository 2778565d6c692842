//! Raw records as backends hand them over.
//!
//! [`RawSource`] and [`RawEvent`] carry what an adapter reads off the wire,
//! before validation, id synthesis or recurrence handling. Recurrence stays
//! in its native dialect ([`RawRecurrence`]) until [`crate::recurrence`]
//! normalizes it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use calmux_core::{BackendKind, midnight_utc};

/// A calendar container as discovered by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSource {
    /// List GUID or mailbox calendar id.
    pub id: String,
    pub title: String,
    /// Site URL for list calendars, owner address for mailbox calendars.
    pub container: String,
    pub color: Option<String>,
    pub is_hidden: bool,
    pub can_edit: bool,
    pub can_share: bool,
    pub item_count: Option<u64>,
}

impl RawSource {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            container: container.into(),
            color: None,
            is_hidden: false,
            can_edit: false,
            can_share: false,
            item_count: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.is_hidden = hidden;
        self
    }

    pub fn with_permissions(mut self, can_edit: bool, can_share: bool) -> Self {
        (self.can_edit, self.can_share) = (can_edit, can_share);
        self
    }

    pub fn with_item_count(mut self, count: u64) -> Self {
        self.item_count = Some(count);
        self
    }
}

/// Start or end of a raw event: an instant, or a bare date for all-day items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum RawEventTime {
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
}

impl RawEventTime {
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self::Date(date)
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// The instant itself, or midnight UTC of the date.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match *self {
            Self::DateTime(dt) => dt,
            Self::Date(date) => midnight_utc(date),
        }
    }
}

/// A recurrence payload in its backend dialect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "payload", rename_all = "snake_case")]
pub enum RawRecurrence {
    /// Attribute-tagged XML rule (`<recurrence><rule>...`) of list-based backends.
    ListRule(String),
    /// `{ "pattern": {...}, "range": {...} }` JSON of mailbox-based backends.
    MailboxPattern(serde_json::Value),
}

impl RawRecurrence {
    /// The backend family whose dialect this payload is written in.
    pub fn format(&self) -> BackendKind {
        match self {
            Self::ListRule(_) => BackendKind::ListBased,
            Self::MailboxPattern(_) => BackendKind::MailboxBased,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAttendee {
    pub email: String,
    pub display_name: Option<String>,
}

impl RawAttendee {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// One item read from a source.
///
/// A series master carries `recurrence` and its first occurrence in
/// `start`/`end`; [`crate::normalize_event`] turns it into canonical events.
/// Text fields are whatever the backend sent, untrimmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Item id inside its source.
    pub id: String,
    /// Native id of the owning source.
    pub source_id: String,
    pub start: RawEventTime,
    pub end: RawEventTime,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    /// `"cancelled"` (any case) drops the item during normalization.
    pub status: Option<String>,
    /// Priority in the backend's own vocabulary.
    pub importance: Option<String>,
    /// Per-item override of the source color.
    pub color: Option<String>,
    pub organizer_name: Option<String>,
    pub organizer_email: Option<String>,
    #[serde(default)]
    pub attendees: Vec<RawAttendee>,
    pub recurrence: Option<RawRecurrence>,
}

impl RawEvent {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        start: RawEventTime,
        end: RawEventTime,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            start,
            end,
            title: None,
            description: None,
            location: None,
            status: None,
            importance: None,
            color: None,
            organizer_name: None,
            organizer_email: None,
            attendees: Vec::new(),
            recurrence: None,
        }
    }

    /// The title, or `"(No title)"` when missing or blank.
    pub fn effective_title(&self) -> &str {
        non_blank(self.title.as_deref()).unwrap_or("(No title)")
    }

    /// Organizer display name, else address, else empty.
    pub fn effective_organizer(&self) -> &str {
        non_blank(self.organizer_name.as_deref())
            .or(self.organizer_email.as_deref())
            .unwrap_or_default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case("cancelled"))
    }

    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_importance(mut self, importance: impl Into<String>) -> Self {
        self.importance = Some(importance.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Sets the organizer address.
    pub fn with_organizer(mut self, email: impl Into<String>) -> Self {
        self.organizer_email = Some(email.into());
        self
    }

    pub fn with_organizer_name(mut self, name: impl Into<String>) -> Self {
        self.organizer_name = Some(name.into());
        self
    }

    pub fn with_attendee(mut self, attendee: RawAttendee) -> Self {
        self.attendees.push(attendee);
        self
    }

    pub fn with_recurrence(mut self, recurrence: RawRecurrence) -> Self {
        self.recurrence = Some(recurrence);
        self
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}
