//! Calendar source and event types.
//!
//! This module provides the backend-agnostic data model shared by every
//! layer of calmux:
//! - [`CalendarSource`]: one addressable calendar container
//! - [`CalendarEvent`]: one concrete, dated event (base event or occurrence)
//! - [`BackendKind`]: the family of backend a source comes from
//! - [`Importance`] and [`Attendee`]: event metadata

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The family of backend a calendar source lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// List-based provider (calendar lists hosted on a site).
    ListBased,
    /// Mailbox-based provider (calendars attached to a mailbox).
    MailboxBased,
}

impl BackendKind {
    /// All backend kinds, in the order they are queried.
    pub const ALL: [BackendKind; 2] = [BackendKind::ListBased, BackendKind::MailboxBased];

    /// Prefix used when synthesizing globally unique identifiers.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::ListBased => "list",
            Self::MailboxBased => "mbox",
        }
    }

    /// Returns a stable name for logs and cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListBased => "list_based",
            Self::MailboxBased => "mailbox_based",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event importance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
}

impl Importance {
    /// Parses a backend importance/priority string, falling back to `Normal`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" | "(3) low" => Self::Low,
            "high" | "(1) high" => Self::High,
            _ => Self::Normal,
        }
    }
}

/// An attendee of a calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// Display name, if known.
    pub name: Option<String>,
    /// Email address.
    pub email: String,
}

impl Attendee {
    /// Creates an attendee from an email address.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Builder method to set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// One addressable calendar container from a backend.
///
/// `id` is globally unique across backends: it is synthesized as
/// `<backend prefix>_<native id>` when the source is discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSource {
    /// Globally unique identifier.
    pub id: String,
    /// Identifier of the container inside its backend.
    pub native_id: String,
    /// Human-readable title.
    pub title: String,
    /// Which backend family hosts the source.
    pub backend_kind: BackendKind,
    /// Display color (`#rrggbb`).
    pub color: String,
    /// Site URL (list-based) or mailbox address (mailbox-based).
    pub container: String,
    /// Whether the source takes part in aggregation.
    pub is_enabled: bool,
    /// Whether the current user can edit the source.
    pub can_edit: bool,
    /// Whether the current user can share the source.
    pub can_share: bool,
    /// Number of items, if the backend reports it.
    pub item_count: Option<u64>,
}

impl CalendarSource {
    /// Creates an enabled source with a synthesized global id.
    pub fn new(
        backend_kind: BackendKind,
        native_id: impl Into<String>,
        title: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        let native_id = native_id.into();
        Self {
            id: Self::global_id(backend_kind, &native_id),
            native_id,
            title: title.into(),
            backend_kind,
            color: String::new(),
            container: container.into(),
            is_enabled: true,
            can_edit: false,
            can_share: false,
            item_count: None,
        }
    }

    /// Synthesizes the globally unique id for a backend-native id.
    pub fn global_id(kind: BackendKind, native_id: &str) -> String {
        format!("{}_{}", kind.prefix(), native_id)
    }

    /// Builder method to set the color.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Builder method to enable or disable the source.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.is_enabled = enabled;
        self
    }

    /// Builder method to set edit/share permissions.
    pub fn with_permissions(mut self, can_edit: bool, can_share: bool) -> Self {
        self.can_edit = can_edit;
        self.can_share = can_share;
        self
    }

    /// Builder method to set the item count.
    pub fn with_item_count(mut self, count: u64) -> Self {
        self.item_count = Some(count);
        self
    }
}

/// A concrete calendar event.
///
/// Events are value types: they are built once per query (from a backend
/// record, or by the recurrence expander) and never mutated afterwards.
/// Recurring instances point back at their generating base event through
/// `master_series_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Identifier, `<source id>_<native id>[_recur_<n>]`.
    pub id: String,
    /// Event title.
    pub title: String,
    /// Plain description (may be empty).
    pub description: String,
    /// Location, if any.
    pub location: Option<String>,
    /// Start (inclusive).
    pub start: DateTime<Utc>,
    /// End (exclusive).
    pub end: DateTime<Utc>,
    /// Whether the event spans whole days.
    pub is_all_day: bool,
    /// Whether the event belongs to a recurring series.
    pub is_recurring: bool,
    /// Global id of the owning source.
    pub source_id: String,
    /// Organizer display name or address (empty when unknown).
    pub organizer: String,
    /// Attendees.
    pub attendees: Vec<Attendee>,
    /// Importance.
    pub importance: Importance,
    /// Display color (`#rrggbb`).
    pub color: String,
    /// Id of the base event this occurrence was generated from.
    pub master_series_id: Option<String>,
}

impl CalendarEvent {
    /// Creates a new event with the required fields.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            location: None,
            start,
            end,
            is_all_day: false,
            is_recurring: false,
            source_id: source_id.into(),
            organizer: String::new(),
            attendees: Vec::new(),
            importance: Importance::Normal,
            color: String::new(),
            master_series_id: None,
        }
    }

    /// Returns the event duration.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Returns true if the event's interval overlaps `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }

    /// Builds the `n`-th occurrence of this event starting at `start`.
    ///
    /// Every field is copied except the id (suffixed `_recur_<n>`), the
    /// start, and the end (start plus the original duration).
    pub fn occurrence(&self, n: usize, start: DateTime<Utc>) -> Self {
        Self {
            id: format!("{}_recur_{}", self.id, n),
            start,
            end: start + self.duration(),
            is_recurring: true,
            master_series_id: Some(self.id.clone()),
            ..self.clone()
        }
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Builder method to mark the event as all-day.
    pub fn with_all_day(mut self, all_day: bool) -> Self {
        self.is_all_day = all_day;
        self
    }

    /// Builder method to mark the event as recurring.
    pub fn with_recurring(mut self, recurring: bool) -> Self {
        self.is_recurring = recurring;
        self
    }

    /// Builder method to set the organizer.
    pub fn with_organizer(mut self, organizer: impl Into<String>) -> Self {
        self.organizer = organizer.into();
        self
    }

    /// Builder method to add an attendee.
    pub fn with_attendee(mut self, attendee: Attendee) -> Self {
        self.attendees.push(attendee);
        self
    }

    /// Builder method to set the importance.
    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    /// Builder method to set the color.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }
}
