//! Conversion between Google Calendar API events and engine types.

use std::collections::HashMap;

use google_calendar::types as google;

use calsinki_core::event::{
    Attendee, DestinationEvent, EventTime, RecurrenceRole, SourceEvent, Visibility,
};
use calsinki_core::planner::EventPayload;

fn parse_event_time(value: &Option<google::EventDateTime>) -> Option<EventTime> {
    let value = value.as_ref()?;
    if let Some(dt) = value.date_time {
        Some(EventTime::DateTime(dt))
    } else {
        value.date.map(EventTime::Date)
    }
}

fn event_time_to_google(time: &EventTime) -> google::EventDateTime {
    match time {
        EventTime::Date(d) => google::EventDateTime {
            date: Some(*d),
            date_time: None,
            time_zone: String::new(),
        },
        EventTime::DateTime(dt) => google::EventDateTime {
            date: None,
            date_time: Some(*dt),
            time_zone: String::new(),
        },
    }
}

fn recurrence_role(event: &google::Event) -> RecurrenceRole {
    if !event.recurring_event_id.is_empty() {
        RecurrenceRole::Instance {
            master_id: event.recurring_event_id.clone(),
        }
    } else if !event.recurrence.is_empty() {
        RecurrenceRole::Master
    } else {
        RecurrenceRole::Single
    }
}

fn private_properties(event: &google::Event) -> HashMap<String, String> {
    event
        .extended_properties
        .as_ref()
        .map(|props| props.private.clone())
        .unwrap_or_default()
}

fn parse_visibility(event: &google::Event) -> Visibility {
    match event.visibility.as_str() {
        "public" => Visibility::Public,
        "private" | "confidential" => Visibility::Private,
        _ => Visibility::Default,
    }
}

fn visibility_to_google(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Default => "",
        Visibility::Public => "public",
        Visibility::Private => "private",
    }
}

/// Convert a Google event from a source calendar listing.
/// Cancelled events and events without an id or times are dropped.
pub fn to_source_event(event: google::Event) -> Option<SourceEvent> {
    if event.id.is_empty() || event.status == "cancelled" {
        return None;
    }
    let start = parse_event_time(&event.start)?;
    let end = parse_event_time(&event.end)?;

    let attendees: Vec<Attendee> = event
        .attendees
        .iter()
        .map(|a| Attendee {
            name: if a.display_name.is_empty() {
                None
            } else {
                Some(a.display_name.clone())
            },
            email: a.email.clone(),
        })
        .collect();

    Some(SourceEvent {
        summary: if event.summary.is_empty() {
            "(No title)".to_string()
        } else {
            event.summary.clone()
        },
        description: if event.description.is_empty() {
            None
        } else {
            Some(event.description.clone())
        },
        location: if event.location.is_empty() {
            None
        } else {
            Some(event.location.clone())
        },
        start,
        end,
        visibility: parse_visibility(&event),
        recurrence: recurrence_role(&event),
        updated: event.updated,
        deleted: false,
        attendees,
        extended_properties: private_properties(&event),
        id: event.id,
    })
}

/// Convert a Google event from a destination calendar listing.
pub fn to_destination_event(event: google::Event) -> Option<DestinationEvent> {
    if event.id.is_empty() || event.status == "cancelled" {
        return None;
    }
    let start = parse_event_time(&event.start)?;
    let end = parse_event_time(&event.end)?;

    Some(DestinationEvent {
        summary: event.summary.clone(),
        start,
        end,
        recurrence: recurrence_role(&event),
        extended_properties: private_properties(&event),
        id: event.id,
    })
}

/// Render an engine payload as a Google event body for insert/patch.
pub fn to_google_event(payload: &EventPayload) -> google::Event {
    let attendees: Vec<google::EventAttendee> = payload
        .attendees
        .iter()
        .map(|a| google::EventAttendee {
            email: a.email.clone(),
            display_name: a.name.clone().unwrap_or_default(),
            response_status: String::new(),
            additional_guests: 0,
            comment: String::new(),
            id: String::new(),
            optional: false,
            organizer: false,
            resource: false,
            self_: false,
        })
        .collect();

    google::Event {
        summary: payload.summary.clone(),
        description: payload.description.clone().unwrap_or_default(),
        location: payload.location.clone().unwrap_or_default(),
        start: Some(event_time_to_google(&payload.start)),
        end: Some(event_time_to_google(&payload.end)),
        visibility: visibility_to_google(payload.visibility).to_string(),
        color_id: payload.color_id.clone().unwrap_or_default(),
        attendees,
        extended_properties: Some(google::ExtendedProperties {
            private: payload.extended_properties.clone(),
            shared: HashMap::new(),
        }),
        ..Default::default()
    }
}
