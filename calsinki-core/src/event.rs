//! Provider-neutral event types.
//!
//! Providers convert their API responses into these types, and the engine
//! works exclusively with them for loop filtering, matching and planning.
//! Events are ephemeral: fetched fresh each pass, never cached locally.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Start or end of an event: timed, or all-day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventTime {
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
}

impl EventTime {
    /// Clock label for privacy titles ("09:30"); all-day events have none.
    pub fn clock_label(&self) -> Option<String> {
        match self {
            EventTime::DateTime(dt) => Some(dt.format("%H:%M").to_string()),
            EventTime::Date(_) => None,
        }
    }
}

/// Event visibility as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Default,
    Public,
    Private,
}

/// Recurrence role, resolved once at fetch time.
///
/// Deleting a series means deleting the master: removing an instance
/// directly leaves the rest of the series dangling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrenceRole {
    /// Not part of a recurring series.
    Single,
    /// Series master (carries the recurrence definition).
    Master,
    /// Expanded instance of a series.
    Instance { master_id: String },
}

/// An event attendee (also used for the organizer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    pub name: Option<String>,
    pub email: String,
}

/// One calendar entry read from a source calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEvent {
    /// Provider-assigned identifier, stable across fetches.
    pub id: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub visibility: Visibility,
    pub recurrence: RecurrenceRole,
    /// Last modification timestamp; some providers omit it.
    pub updated: Option<DateTime<Utc>>,
    /// Tombstone flag, for providers that report deletions in listings.
    pub deleted: bool,
    pub attendees: Vec<Attendee>,
    /// Raw private extended properties, as stored by the provider.
    pub extended_properties: HashMap<String, String>,
}

/// One calendar entry in a destination calendar.
///
/// Either user-authored (foreign, never mutated) or engine-authored,
/// distinguished by the sync metadata in its extended properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationEvent {
    pub id: String,
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
    pub recurrence: RecurrenceRole,
    pub extended_properties: HashMap<String, String>,
}
