//! Correlation matching between source events and previously-synced
//! destination events.
//!
//! The index is rebuilt from a full destination listing on every pass
//! rather than maintained incrementally: a prior run's partial failure can
//! leave stale duplicates behind that only a full scan detects.

use std::collections::HashMap;

use tracing::warn;

use crate::event::DestinationEvent;
use crate::metadata::{CorrelationKey, SyncMetadata};

/// A destination event recognized as engine-owned, with its parsed record.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedDestination {
    pub event: DestinationEvent,
    pub metadata: SyncMetadata,
}

/// Outcome of looking up one source event.
#[derive(Debug)]
pub struct MatchOutcome<'a> {
    /// The canonical destination event, when at least one matched.
    pub canonical: Option<&'a OwnedDestination>,
    /// Stale duplicates behind the canonical pick, flagged for cleanup.
    pub duplicates: Vec<&'a OwnedDestination>,
}

pub struct MatchIndex {
    by_key: HashMap<CorrelationKey, Vec<OwnedDestination>>,
}

impl MatchIndex {
    /// Build the index from a full destination listing, keeping only owned
    /// events synced from `source_calendar_id`. Events with no metadata, or
    /// with malformed metadata, are foreign: they are dropped here and the
    /// engine never mutates them.
    pub fn build(events: Vec<DestinationEvent>, source_calendar_id: &str) -> Self {
        let mut by_key: HashMap<CorrelationKey, Vec<OwnedDestination>> = HashMap::new();

        for event in events {
            let Some(metadata) = SyncMetadata::parse(&event.extended_properties) else {
                continue;
            };
            if metadata.source_calendar_id != source_calendar_id {
                continue;
            }
            by_key
                .entry(metadata.correlation_key())
                .or_default()
                .push(OwnedDestination { event, metadata });
        }

        // Most-recently-synced first, ties broken by sync count then id, so
        // the canonical pick is deterministic.
        for matches in by_key.values_mut() {
            matches.sort_by(|a, b| {
                (b.metadata.last_synced, b.metadata.sync_count, &b.event.id).cmp(&(
                    a.metadata.last_synced,
                    a.metadata.sync_count,
                    &a.event.id,
                ))
            });
        }

        MatchIndex { by_key }
    }

    /// Look up the destination events correlated with one source event.
    ///
    /// More than one match means a prior partial failure left duplicates:
    /// the most-recently-synced one is canonical, the rest are flagged for
    /// removal and the anomaly is logged.
    pub fn lookup(&self, key: &CorrelationKey) -> MatchOutcome<'_> {
        match self.by_key.get(key) {
            None => MatchOutcome {
                canonical: None,
                duplicates: Vec::new(),
            },
            Some(matches) => {
                if matches.len() > 1 {
                    warn!(
                        source_event_id = %key.source_event_id,
                        count = matches.len(),
                        "duplicate correlation key in destination calendar"
                    );
                }
                MatchOutcome {
                    canonical: matches.first(),
                    duplicates: matches.iter().skip(1).collect(),
                }
            }
        }
    }

    /// All correlated entries, canonical-first per key. Used by the
    /// deletion sweep.
    pub fn entries(&self) -> impl Iterator<Item = (&CorrelationKey, &Vec<OwnedDestination>)> {
        self.by_key.iter()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventTime, RecurrenceRole};
    use crate::metadata::SYNC_VERSION;
    use chrono::{NaiveDate, TimeZone, Utc};

    const SOURCE_CAL: &str = "work@example.com";

    fn make_destination(id: &str, source_event_id: &str, synced_hour: u32) -> DestinationEvent {
        let metadata = SyncMetadata {
            source_calendar_id: SOURCE_CAL.to_string(),
            source_event_id: source_event_id.to_string(),
            last_synced: Utc.with_ymd_and_hms(2026, 3, 1, synced_hour, 0, 0).unwrap(),
            sync_count: 1,
            sync_version: SYNC_VERSION,
        };
        DestinationEvent {
            id: id.to_string(),
            summary: "Busy".to_string(),
            start: EventTime::Date(NaiveDate::from_ymd_opt(2026, 3, 20).unwrap()),
            end: EventTime::Date(NaiveDate::from_ymd_opt(2026, 3, 21).unwrap()),
            recurrence: RecurrenceRole::Single,
            extended_properties: metadata.to_properties("calsinki_synced", "calsinki_r1_synced"),
        }
    }

    fn key(source_event_id: &str) -> CorrelationKey {
        CorrelationKey {
            source_calendar_id: SOURCE_CAL.to_string(),
            source_event_id: source_event_id.to_string(),
        }
    }

    #[test]
    fn no_match_for_unknown_key() {
        let index = MatchIndex::build(vec![make_destination("d1", "e1", 8)], SOURCE_CAL);
        let outcome = index.lookup(&key("e2"));
        assert!(outcome.canonical.is_none());
        assert!(outcome.duplicates.is_empty());
    }

    #[test]
    fn single_match() {
        let index = MatchIndex::build(vec![make_destination("d1", "e1", 8)], SOURCE_CAL);
        let outcome = index.lookup(&key("e1"));
        assert_eq!(outcome.canonical.unwrap().event.id, "d1");
        assert!(outcome.duplicates.is_empty());
    }

    #[test]
    fn duplicates_pick_most_recently_synced() {
        let index = MatchIndex::build(
            vec![
                make_destination("d-old", "e1", 8),
                make_destination("d-new", "e1", 9),
            ],
            SOURCE_CAL,
        );
        let outcome = index.lookup(&key("e1"));
        assert_eq!(outcome.canonical.unwrap().event.id, "d-new");
        assert_eq!(outcome.duplicates.len(), 1);
        assert_eq!(outcome.duplicates[0].event.id, "d-old");
    }

    #[test]
    fn foreign_events_are_ignored() {
        let mut foreign = make_destination("d1", "e1", 8);
        foreign.extended_properties.clear();
        let index = MatchIndex::build(vec![foreign], SOURCE_CAL);
        assert!(index.is_empty());
    }

    #[test]
    fn malformed_metadata_is_foreign() {
        let mut broken = make_destination("d1", "e1", 8);
        broken
            .extended_properties
            .insert("last_synced".to_string(), "not-a-timestamp".to_string());
        let index = MatchIndex::build(vec![broken], SOURCE_CAL);
        assert!(index.is_empty());
    }

    #[test]
    fn other_sources_are_excluded() {
        // Same destination calendar may hold copies from several rules.
        let mut other = make_destination("d2", "e9", 8);
        other
            .extended_properties
            .insert("source_calendar_id".to_string(), "home@example.com".to_string());
        let index = MatchIndex::build(vec![make_destination("d1", "e1", 8), other], SOURCE_CAL);
        assert_eq!(index.len(), 1);
    }
}
