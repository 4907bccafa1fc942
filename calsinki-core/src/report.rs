//! Structured results of sync and purge passes.
//!
//! Every pass produces a report, even on partial failure, so callers can
//! always print an accounting of what happened (or, under dry-run, what
//! would have happened).

use serde::{Deserialize, Serialize};

/// Execution phases of one target pass. `Failed` is reachable from any
/// phase on an unrecoverable calendar-API error; recoverable per-event
/// errors never leave the `Applying` phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionPhase {
    Pending,
    Fetching,
    Planning,
    Applying,
    Completed,
    Failed { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyKind {
    /// More than one destination event shared a correlation key.
    DuplicateCorrelation,
    /// An update target vanished out-of-band; the event was recreated.
    UpdateTargetMissing,
    /// A mutation failed after retries; the pass continued without it.
    MutationFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl MutationCounts {
    /// Mutations that touch the destination calendar.
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    pub fn add(&mut self, other: &MutationCounts) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Result of syncing one destination target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub target_name: String,
    pub calendar_id: String,
    pub phase: ExecutionPhase,
    pub counts: MutationCounts,
    pub anomalies: Vec<Anomaly>,
    /// Planned mutation descriptions, populated under dry-run.
    pub planned: Vec<String>,
}

impl TargetReport {
    pub fn new(target_name: &str, calendar_id: &str) -> Self {
        TargetReport {
            target_name: target_name.to_string(),
            calendar_id: calendar_id.to_string(),
            phase: ExecutionPhase::Pending,
            counts: MutationCounts::default(),
            anomalies: Vec::new(),
            planned: Vec::new(),
        }
    }

    pub fn failed(&self) -> bool {
        matches!(self.phase, ExecutionPhase::Failed { .. })
    }
}

/// Result of one rule's sync pass across all its enabled targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub rule_id: String,
    pub dry_run: bool,
    /// Source events excluded by the loop guard.
    pub loop_exclusions: usize,
    pub targets: Vec<TargetReport>,
}

impl SyncReport {
    pub fn new(rule_id: &str, dry_run: bool) -> Self {
        SyncReport {
            rule_id: rule_id.to_string(),
            dry_run,
            loop_exclusions: 0,
            targets: Vec::new(),
        }
    }

    pub fn totals(&self) -> MutationCounts {
        let mut totals = MutationCounts::default();
        for target in &self.targets {
            totals.add(&target.counts);
        }
        totals
    }

    pub fn failed(&self) -> bool {
        self.targets.iter().any(TargetReport::failed)
    }
}

/// Result of purging one destination target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurgeTargetReport {
    pub target_name: String,
    pub calendar_id: String,
    pub phase: ExecutionPhase,
    pub deleted: usize,
    pub failed: usize,
    /// Series instances collapsed into their master's deletion.
    pub instances_collapsed: usize,
    /// Planned deletion descriptions, populated under dry-run.
    pub planned: Vec<String>,
}

impl PurgeTargetReport {
    pub fn new(target_name: &str, calendar_id: &str) -> Self {
        PurgeTargetReport {
            target_name: target_name.to_string(),
            calendar_id: calendar_id.to_string(),
            phase: ExecutionPhase::Pending,
            deleted: 0,
            failed: 0,
            instances_collapsed: 0,
            planned: Vec::new(),
        }
    }

    pub fn failed(&self) -> bool {
        matches!(self.phase, ExecutionPhase::Failed { .. })
    }
}

/// Result of a purge pass, for one rule or for the whole instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurgeReport {
    /// Rule id, or "all".
    pub scope: String,
    pub dry_run: bool,
    pub targets: Vec<PurgeTargetReport>,
}

impl PurgeReport {
    pub fn new(scope: &str, dry_run: bool) -> Self {
        PurgeReport {
            scope: scope.to_string(),
            dry_run,
            targets: Vec::new(),
        }
    }

    pub fn total_deleted(&self) -> usize {
        self.targets.iter().map(|target| target.deleted).sum()
    }

    pub fn failed(&self) -> bool {
        self.targets.iter().any(PurgeTargetReport::failed)
    }
}
