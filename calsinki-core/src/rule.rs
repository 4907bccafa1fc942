//! Sync rule entities, consumed read-only by the engine.
//!
//! Calendar labels are resolved to provider calendar ids by the
//! configuration layer before rules reach the engine; everything here is
//! already concrete.

use serde::{Deserialize, Serialize};

use crate::metadata::MARKER_SUFFIX;

/// Instance identifier used when the configuration does not set one.
pub const DEFAULT_IDENTIFIER: &str = "calsinki";

/// How much of a source event's content reaches the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyMode {
    /// Copy title, description, location and attendees through.
    Public,
    /// Replace the title with an anonymous label and strip all content.
    Private,
}

/// One destination of a sync rule, with its own customization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTarget {
    /// Account that owns the destination calendar.
    pub account: String,
    /// Resolved provider calendar id.
    pub calendar_id: String,
    /// Human-readable calendar name, for reports.
    pub name: String,
    pub privacy_mode: PrivacyMode,
    /// Anonymous title used under private mode.
    pub privacy_label: String,
    /// Append the source start time to the privacy label.
    pub show_time: bool,
    pub title_prefix: String,
    pub title_suffix: String,
    /// Google color id; empty leaves the destination calendar's default.
    pub event_color: String,
    pub enabled: bool,
}

/// One source calendar fanning out to destination targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRule {
    pub id: String,
    pub source_account: String,
    pub source_calendar_id: String,
    /// Human-readable source name, used in provenance footers.
    pub source_name: String,
    pub targets: Vec<SyncTarget>,
}

impl SyncRule {
    pub fn enabled_targets(&self) -> impl Iterator<Item = &SyncTarget> {
        self.targets.iter().filter(|target| target.enabled)
    }

    /// Marker key naming this specific rule ("calsinki_work_to_home_synced").
    /// Used to search destination calendars and to scope purges.
    pub fn marker(&self, identifier: &str) -> String {
        format!("{}_{}{}", identifier, self.id, MARKER_SUFFIX)
    }
}

/// Marker key shared by every rule of this instance ("calsinki_synced").
pub fn instance_marker(identifier: &str) -> String {
    format!("{}{}", identifier, MARKER_SUFFIX)
}
