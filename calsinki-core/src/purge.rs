//! Purge planning: the reverse of sync.
//!
//! Given a marker-filtered destination listing, compute the set of events
//! to remove. Recurring series are removed by deleting the series master
//! only; deleting an instance directly would leave the rest of the series
//! dangling.

use std::collections::HashSet;

use tracing::debug;

use crate::event::{DestinationEvent, RecurrenceRole};

/// One planned purge deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct PurgeDeletion {
    pub event_id: String,
    pub summary: String,
}

#[derive(Debug, Default)]
pub struct PurgePlan {
    pub deletions: Vec<PurgeDeletion>,
    /// Instances whose deletion is covered by their series master.
    pub instances_collapsed: usize,
}

/// Collapse a destination listing into the deletion set. Instances are
/// folded into their master, and ids are deduplicated so a master listed
/// alongside its own instances is deleted exactly once.
pub fn plan_purge(events: &[DestinationEvent]) -> PurgePlan {
    let mut plan = PurgePlan::default();
    let mut targeted: HashSet<String> = HashSet::new();

    for event in events {
        let event_id = match &event.recurrence {
            RecurrenceRole::Instance { master_id } => {
                plan.instances_collapsed += 1;
                master_id.clone()
            }
            _ => event.id.clone(),
        };

        if targeted.insert(event_id.clone()) {
            plan.deletions.push(PurgeDeletion {
                event_id,
                summary: event.summary.clone(),
            });
        } else {
            debug!(event_id = %event.id, "series already targeted via its master");
        }
    }

    plan
}
