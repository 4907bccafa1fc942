//! The calendar transport seam.
//!
//! Providers implement this trait; the engine stays provider-agnostic and
//! tests run against an in-memory fake. All calls are blocking from the
//! engine's point of view: no mutation proceeds until its preceding fetch
//! completes.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::SyncResult;
use crate::event::{DestinationEvent, SourceEvent};
use crate::planner::EventPayload;

/// Bounded fetch window for a sync pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Window spanning `days` in each direction around now.
    pub fn around_now(days: i64) -> Self {
        let now = Utc::now();
        TimeWindow {
            start: now - Duration::days(days),
            end: now + Duration::days(days),
        }
    }
}

#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// List events from a source calendar within the window, recurring
    /// series expanded into instances.
    async fn list_source_events(
        &self,
        account: &str,
        calendar_id: &str,
        window: &TimeWindow,
    ) -> SyncResult<Vec<SourceEvent>>;

    /// List destination events carrying `marker = "true"` in their private
    /// extended properties. Must return the full current state for the
    /// marker, not an incremental view: stale duplicates left by a prior
    /// partial failure are only detectable in a full listing.
    async fn list_destination_events(
        &self,
        account: &str,
        calendar_id: &str,
        marker: &str,
    ) -> SyncResult<Vec<DestinationEvent>>;

    /// Insert a new event, returning the provider-assigned id.
    async fn insert_event(
        &self,
        account: &str,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> SyncResult<String>;

    /// Overwrite an existing event with the full payload.
    async fn patch_event(
        &self,
        account: &str,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> SyncResult<()>;

    async fn delete_event(
        &self,
        account: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> SyncResult<()>;
}
