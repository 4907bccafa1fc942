//! `CalendarApi` implementation against the Google Calendar v3 API.
//!
//! Transport errors are classified into the engine's taxonomy here, by
//! inspecting the client error text: the engine decides retry and fallback
//! behavior per variant.

use async_trait::async_trait;
use google_calendar::types::{OrderBy, SendUpdates};
use google_calendar::Client;
use tracing::debug;

use calsinki_core::api::{CalendarApi, TimeWindow};
use calsinki_core::error::{SyncError, SyncResult};
use calsinki_core::event::{DestinationEvent, SourceEvent};
use calsinki_core::planner::EventPayload;

use crate::convert;
use crate::session;

#[derive(Default)]
pub struct GoogleCalendarApi;

impl GoogleCalendarApi {
    pub fn new() -> Self {
        GoogleCalendarApi
    }

    async fn client_for(&self, account: &str) -> SyncResult<Client> {
        session::client_for_account(account)
            .await
            .map_err(|e| SyncError::Config(format!("{:#}", e)))
    }
}

/// Map a client error onto the engine taxonomy. The google-calendar client
/// surfaces HTTP failures as text, so classification is by status marker.
fn classify_error(context: &str, error: impl ToString) -> SyncError {
    let text = error.to_string();
    let detail = format!("{}: {}", context, text);

    if text.contains("429")
        || text.contains("rateLimitExceeded")
        || text.contains("quotaExceeded")
    {
        SyncError::RateLimited(detail)
    } else if text.contains("404")
        || text.contains("Not Found")
        || text.contains("410")
        || text.contains("Gone")
    {
        SyncError::NotFound(detail)
    } else {
        SyncError::Transport(detail)
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendarApi {
    async fn list_source_events(
        &self,
        account: &str,
        calendar_id: &str,
        window: &TimeWindow,
    ) -> SyncResult<Vec<SourceEvent>> {
        let client = self.client_for(account).await?;

        let time_min = window.start.to_rfc3339();
        let time_max = window.end.to_rfc3339();
        debug!(calendar_id, %time_min, %time_max, "listing source events");

        let response = client
            .events()
            .list_all(
                calendar_id,
                "",                 // i_cal_uid
                0,                  // max_attendees
                OrderBy::default(), // order_by
                &[],                // private_extended_property
                "",                 // q (search query)
                &[],                // shared_extended_property
                false,              // show_deleted
                false,              // show_hidden_invitations
                true,               // single_events: expand recurring series
                &time_max,          // time_max
                &time_min,          // time_min
                "",                 // time_zone
                "",                 // updated_min
            )
            .await
            .map_err(|e| classify_error("list source events", e))?;

        Ok(response
            .body
            .into_iter()
            .filter_map(convert::to_source_event)
            .collect())
    }

    async fn list_destination_events(
        &self,
        account: &str,
        calendar_id: &str,
        marker: &str,
    ) -> SyncResult<Vec<DestinationEvent>> {
        let client = self.client_for(account).await?;

        // No time bound, and masters kept unexpanded: the engine needs the
        // full current state for the marker, series masters included.
        let search = [format!("{}=true", marker)];

        let response = client
            .events()
            .list_all(
                calendar_id,
                "",
                0,
                OrderBy::default(),
                &search,
                "",
                &[],
                false,
                false,
                false, // single_events
                "",
                "",
                "",
                "",
            )
            .await
            .map_err(|e| classify_error("list destination events", e))?;

        Ok(response
            .body
            .into_iter()
            .filter_map(convert::to_destination_event)
            .collect())
    }

    async fn insert_event(
        &self,
        account: &str,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> SyncResult<String> {
        let client = self.client_for(account).await?;

        let mut event = convert::to_google_event(payload);
        event.id = String::new(); // Google assigns the id

        let response = client
            .events()
            .insert(
                calendar_id,
                0,                 // conference_data_version
                0,                 // max_attendees
                false,             // send_notifications
                SendUpdates::None, // send_updates
                false,             // supports_attachments
                &event,
            )
            .await
            .map_err(|e| classify_error("insert event", e))?;

        Ok(response.body.id)
    }

    async fn patch_event(
        &self,
        account: &str,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> SyncResult<()> {
        let client = self.client_for(account).await?;

        let event = convert::to_google_event(payload);

        client
            .events()
            .patch(
                calendar_id,
                event_id,
                0,
                0,
                false,
                SendUpdates::None,
                false,
                &event,
            )
            .await
            .map_err(|e| classify_error("patch event", e))?;

        Ok(())
    }

    async fn delete_event(
        &self,
        account: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> SyncResult<()> {
        let client = self.client_for(account).await?;

        client
            .events()
            .delete(calendar_id, event_id, false, SendUpdates::None)
            .await
            .map_err(|e| classify_error("delete event", e))?;

        Ok(())
    }
}
