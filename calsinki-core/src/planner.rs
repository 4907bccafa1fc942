//! Mutation planning.
//!
//! Decides create/update/skip/delete for each (source event, matched
//! destination) pair and builds the privacy-adjusted payload. Planning is
//! pure: every decision is a function of the inputs and the pass
//! timestamp, so a dry run plans exactly what a live run would apply.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::{Attendee, EventTime, SourceEvent, Visibility};
use crate::matcher::{MatchIndex, OwnedDestination};
use crate::metadata::{SyncMetadata, SYNC_VERSION};
use crate::rule::{instance_marker, PrivacyMode, SyncRule, SyncTarget};

/// The payload written to a destination event on create or update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    /// Mirrors the source event's visibility.
    pub visibility: Visibility,
    /// Google color id; `None` leaves the calendar default.
    pub color_id: Option<String>,
    pub attendees: Vec<Attendee>,
    /// Sync metadata and marker keys, stamped as private extended
    /// properties.
    pub extended_properties: HashMap<String, String>,
}

/// Why a source event produced no mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Source has not changed since the last pass, and no customization
    /// changed the rendered payload.
    Unchanged,
    /// Source is tombstoned and nothing was ever synced for it.
    DeletedNotSynced,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Unchanged => "unchanged",
            SkipReason::DeletedNotSynced => "deleted, never synced",
        }
    }
}

/// One planned change against a destination calendar.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create {
        payload: EventPayload,
    },
    Update {
        destination_id: String,
        payload: EventPayload,
    },
    Delete {
        destination_id: String,
    },
    Skip {
        reason: SkipReason,
    },
}

impl Mutation {
    /// Short human-readable form, for dry-run reports.
    pub fn describe(&self) -> String {
        match self {
            Mutation::Create { payload } => format!("create \"{}\"", payload.summary),
            Mutation::Update {
                destination_id,
                payload,
            } => format!("update {} -> \"{}\"", destination_id, payload.summary),
            Mutation::Delete { destination_id } => format!("delete {}", destination_id),
            Mutation::Skip { reason } => format!("skip ({})", reason.as_str()),
        }
    }
}

/// Result of the deletion sweep over the correlation index.
#[derive(Debug, Default)]
pub struct DeletionPlan {
    pub mutations: Vec<Mutation>,
    /// Destination ids of duplicate-correlation extras being cleaned up.
    pub duplicate_cleanups: Vec<String>,
}

/// Plans mutations for one (rule, target) pair.
pub struct Planner<'a> {
    rule: &'a SyncRule,
    target: &'a SyncTarget,
    identifier: &'a str,
    now: DateTime<Utc>,
}

impl<'a> Planner<'a> {
    pub fn new(
        rule: &'a SyncRule,
        target: &'a SyncTarget,
        identifier: &'a str,
        now: DateTime<Utc>,
    ) -> Self {
        Planner {
            rule,
            target,
            identifier,
            now,
        }
    }

    /// Decide the mutation for one source event.
    pub fn plan(&self, source: &SourceEvent, matched: Option<&OwnedDestination>) -> Mutation {
        if source.deleted {
            return match matched {
                Some(dest) => Mutation::Delete {
                    destination_id: dest.event.id.clone(),
                },
                None => Mutation::Skip {
                    reason: SkipReason::DeletedNotSynced,
                },
            };
        }

        match matched {
            None => Mutation::Create {
                payload: self.build_payload(source, None),
            },
            Some(dest) => {
                let payload = self.build_payload(source, Some(&dest.metadata));
                if self.needs_update(source, dest, &payload) {
                    Mutation::Update {
                        destination_id: dest.event.id.clone(),
                        payload,
                    }
                } else {
                    Mutation::Skip {
                        reason: SkipReason::Unchanged,
                    }
                }
            }
        }
    }

    /// Sweep phase: deletions for destination events whose source event no
    /// longer appears in the current listing, plus cleanup of
    /// duplicate-correlation extras behind each canonical pick.
    pub fn plan_deletions(
        &self,
        source_events: &[SourceEvent],
        index: &MatchIndex,
    ) -> DeletionPlan {
        let seen: HashSet<&str> = source_events.iter().map(|event| event.id.as_str()).collect();
        let mut plan = DeletionPlan::default();

        for (key, matches) in index.entries() {
            if !seen.contains(key.source_event_id.as_str()) {
                debug!(
                    source_event_id = %key.source_event_id,
                    "source event gone, deleting synced copy"
                );
                for dest in matches {
                    plan.mutations.push(Mutation::Delete {
                        destination_id: dest.event.id.clone(),
                    });
                }
                continue;
            }
            // Source still present: the canonical entry is handled by
            // plan(); extras are stale duplicates from a prior partial
            // failure.
            for dest in matches.iter().skip(1) {
                plan.duplicate_cleanups.push(dest.event.id.clone());
                plan.mutations.push(Mutation::Delete {
                    destination_id: dest.event.id.clone(),
                });
            }
        }

        plan
    }

    /// A matched pair needs an update when the source moved past the last
    /// sync, or when the rendered payload no longer matches what the
    /// destination shows (catches customization changes with no source
    /// edit). A source with no modification timestamp is always treated as
    /// changed.
    fn needs_update(
        &self,
        source: &SourceEvent,
        dest: &OwnedDestination,
        payload: &EventPayload,
    ) -> bool {
        let source_advanced = match source.updated {
            Some(updated) => updated > dest.metadata.last_synced,
            None => true,
        };
        source_advanced
            || payload.summary != dest.event.summary
            || payload.start != dest.event.start
            || payload.end != dest.event.end
    }

    fn build_payload(&self, source: &SourceEvent, previous: Option<&SyncMetadata>) -> EventPayload {
        let metadata = SyncMetadata {
            source_calendar_id: self.rule.source_calendar_id.clone(),
            source_event_id: source.id.clone(),
            last_synced: self.now,
            sync_count: previous.map(|m| m.sync_count).unwrap_or(0) + 1,
            sync_version: SYNC_VERSION,
        };
        let extended_properties = metadata.to_properties(
            &instance_marker(self.identifier),
            &self.rule.marker(self.identifier),
        );
        let footer = self.footer();

        match self.effective_privacy_mode(source) {
            PrivacyMode::Private => {
                let label = match (self.target.show_time, source.start.clock_label()) {
                    (true, Some(clock)) => format!("{} - {}", self.target.privacy_label, clock),
                    _ => self.target.privacy_label.clone(),
                };
                EventPayload {
                    summary: self.decorate_title(&label),
                    description: Some(footer),
                    location: None,
                    start: source.start.clone(),
                    end: source.end.clone(),
                    visibility: source.visibility,
                    color_id: self.color(),
                    attendees: Vec::new(),
                    extended_properties,
                }
            }
            PrivacyMode::Public => {
                let description = match &source.description {
                    Some(text) => format!("{}{}", text, footer),
                    None => footer,
                };
                EventPayload {
                    summary: self.decorate_title(&source.summary),
                    description: Some(description),
                    location: source.location.clone(),
                    start: source.start.clone(),
                    end: source.end.clone(),
                    visibility: source.visibility,
                    color_id: self.color(),
                    attendees: source.attendees.clone(),
                    extended_properties,
                }
            }
        }
    }

    /// Source visibility overrides the configured mode: a public source
    /// event keeps its details, a private one is stripped, regardless of
    /// what the target is configured to do.
    fn effective_privacy_mode(&self, source: &SourceEvent) -> PrivacyMode {
        match source.visibility {
            Visibility::Public => PrivacyMode::Public,
            Visibility::Private => PrivacyMode::Private,
            Visibility::Default => self.target.privacy_mode,
        }
    }

    fn decorate_title(&self, title: &str) -> String {
        format!(
            "{}{}{}",
            self.target.title_prefix, title, self.target.title_suffix
        )
    }

    fn color(&self) -> Option<String> {
        if self.target.event_color.is_empty() {
            None
        } else {
            Some(self.target.event_color.clone())
        }
    }

    fn footer(&self) -> String {
        format!(
            "\n\n---\nEvent added by {} from {} calendar.",
            display_name(self.identifier),
            self.rule.source_name
        )
    }
}

/// "my_brand" -> "My Brand", for the provenance footer.
fn display_name(identifier: &str) -> String {
    identifier
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
