//! Sync metadata embedded in a destination event's private extended
//! properties.
//!
//! The destination calendar is the sync state store: there is no local
//! database, and every pass re-derives its view of "what has been synced"
//! from these fields alone.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Current metadata format version, stamped on every write.
pub const SYNC_VERSION: u32 = 1;

/// Suffix shared by all marker keys ("calsinki_synced", "calsinki_work_synced").
pub const MARKER_SUFFIX: &str = "_synced";

pub const KEY_SOURCE_CALENDAR_ID: &str = "source_calendar_id";
pub const KEY_SOURCE_EVENT_ID: &str = "source_event_id";
pub const KEY_LAST_SYNCED: &str = "last_synced";
pub const KEY_SYNC_COUNT: &str = "sync_count";
pub const KEY_SYNC_VERSION: &str = "sync_version";

/// Identifies at most one live destination event per calendar under a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationKey {
    pub source_calendar_id: String,
    pub source_event_id: String,
}

/// The durable sync record carried by an engine-owned destination event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub source_calendar_id: String,
    pub source_event_id: String,
    pub last_synced: DateTime<Utc>,
    /// Incremented on every create/update; 1 after the creating pass.
    pub sync_count: u64,
    pub sync_version: u32,
}

impl SyncMetadata {
    /// Parse metadata out of an extended-properties bag.
    ///
    /// Fails soft: missing or unparseable fields yield `None` and the event
    /// is treated as foreign. Favors leaving user data alone over cleanup.
    pub fn parse(props: &HashMap<String, String>) -> Option<Self> {
        let source_calendar_id = props.get(KEY_SOURCE_CALENDAR_ID)?.clone();
        let source_event_id = props.get(KEY_SOURCE_EVENT_ID)?.clone();
        let last_synced = DateTime::parse_from_rfc3339(props.get(KEY_LAST_SYNCED)?)
            .ok()?
            .with_timezone(&Utc);
        let sync_count = match props.get(KEY_SYNC_COUNT) {
            Some(raw) => raw.parse().ok()?,
            None => 0,
        };
        let sync_version = match props.get(KEY_SYNC_VERSION) {
            Some(raw) => raw.parse().ok()?,
            None => SYNC_VERSION,
        };

        Some(SyncMetadata {
            source_calendar_id,
            source_event_id,
            last_synced,
            sync_count,
            sync_version,
        })
    }

    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey {
            source_calendar_id: self.source_calendar_id.clone(),
            source_event_id: self.source_event_id.clone(),
        }
    }

    /// Render the metadata and marker keys into the extended-properties bag
    /// stamped onto a destination event on create and update.
    pub fn to_properties(
        &self,
        instance_marker: &str,
        rule_marker: &str,
    ) -> HashMap<String, String> {
        let mut props = HashMap::new();
        props.insert(
            KEY_SOURCE_CALENDAR_ID.to_string(),
            self.source_calendar_id.clone(),
        );
        props.insert(KEY_SOURCE_EVENT_ID.to_string(), self.source_event_id.clone());
        props.insert(
            KEY_LAST_SYNCED.to_string(),
            self.last_synced.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        props.insert(KEY_SYNC_COUNT.to_string(), self.sync_count.to_string());
        props.insert(KEY_SYNC_VERSION.to_string(), self.sync_version.to_string());
        props.insert(instance_marker.to_string(), "true".to_string());
        props.insert(rule_marker.to_string(), "true".to_string());
        props
    }
}

/// True when the bag carries any engine marker key. This is the loop
/// guard's ownership test.
pub fn has_marker(props: &HashMap<String, String>) -> bool {
    props
        .iter()
        .any(|(key, value)| key.ends_with(MARKER_SUFFIX) && value == "true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_metadata() -> SyncMetadata {
        SyncMetadata {
            source_calendar_id: "work@example.com".to_string(),
            source_event_id: "evt-1".to_string(),
            last_synced: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            sync_count: 3,
            sync_version: SYNC_VERSION,
        }
    }

    #[test]
    fn round_trips_through_properties() {
        let metadata = make_metadata();
        let props = metadata.to_properties("calsinki_synced", "calsinki_demo_synced");

        let parsed = SyncMetadata::parse(&props).expect("should parse back");
        assert_eq!(parsed, metadata);
        assert_eq!(props.get("calsinki_synced").map(String::as_str), Some("true"));
        assert_eq!(
            props.get("calsinki_demo_synced").map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn missing_correlation_field_is_foreign() {
        let mut props = make_metadata().to_properties("calsinki_synced", "calsinki_demo_synced");
        props.remove(KEY_SOURCE_EVENT_ID);

        assert!(SyncMetadata::parse(&props).is_none());
    }

    #[test]
    fn unparseable_timestamp_is_foreign() {
        let mut props = make_metadata().to_properties("calsinki_synced", "calsinki_demo_synced");
        props.insert(KEY_LAST_SYNCED.to_string(), "yesterday-ish".to_string());

        assert!(SyncMetadata::parse(&props).is_none());
    }

    #[test]
    fn unparseable_count_is_foreign() {
        let mut props = make_metadata().to_properties("calsinki_synced", "calsinki_demo_synced");
        props.insert(KEY_SYNC_COUNT.to_string(), "many".to_string());

        assert!(SyncMetadata::parse(&props).is_none());
    }

    #[test]
    fn missing_count_defaults_to_zero() {
        let mut props = make_metadata().to_properties("calsinki_synced", "calsinki_demo_synced");
        props.remove(KEY_SYNC_COUNT);

        let parsed = SyncMetadata::parse(&props).expect("count is optional");
        assert_eq!(parsed.sync_count, 0);
    }

    #[test]
    fn marker_detection() {
        let mut props = HashMap::new();
        assert!(!has_marker(&props));

        props.insert("some_other_key".to_string(), "true".to_string());
        assert!(!has_marker(&props));

        props.insert("mybrand_rule7_synced".to_string(), "true".to_string());
        assert!(has_marker(&props));
    }

    #[test]
    fn marker_value_must_be_true() {
        let mut props = HashMap::new();
        props.insert("calsinki_synced".to_string(), "false".to_string());
        assert!(!has_marker(&props));
    }
}
