//! Loop prevention.
//!
//! An event that already carries engine metadata was put there by a sync
//! pass (this instance's or a sibling's). In a bi-directional setup, where
//! one rule's source calendar is another rule's destination, propagating
//! such an event again would feed calendars back into each other
//! indefinitely. The guard runs before matching and is a pure filter.

use tracing::info;

use crate::event::SourceEvent;
use crate::metadata;

/// Whether a source event originated from a sync pass.
pub fn is_engine_owned(event: &SourceEvent) -> bool {
    metadata::has_marker(&event.extended_properties)
}

/// Split source events into events to propagate and the number excluded.
///
/// Exclusions are logged at decision time, not silently dropped, so
/// operators can audit suppressed loops.
pub fn partition(events: Vec<SourceEvent>) -> (Vec<SourceEvent>, usize) {
    let mut kept = Vec::with_capacity(events.len());
    let mut excluded = 0;

    for event in events {
        if is_engine_owned(&event) {
            info!(
                event_id = %event.id,
                summary = %event.summary,
                "skipping event already synced by calsinki (loop prevention)"
            );
            excluded += 1;
        } else {
            kept.push(event);
        }
    }

    (kept, excluded)
}
