//! Sync and purge orchestration.
//!
//! Drives one rule end-to-end: fetch, loop-guard, match, plan, apply (or
//! report, under dry-run). Rules and targets are processed sequentially so
//! each destination listing stays consistent with the mutations applied
//! against it; a listing taken at a different instant risks acting on
//! stale matches.

use std::collections::HashSet;
use std::future::Future;

use chrono::Utc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::api::{CalendarApi, TimeWindow};
use crate::error::{SyncError, SyncResult};
use crate::event::SourceEvent;
use crate::guard;
use crate::matcher::MatchIndex;
use crate::metadata::CorrelationKey;
use crate::planner::{Mutation, Planner};
use crate::purge::plan_purge;
use crate::report::{
    Anomaly, AnomalyKind, ExecutionPhase, PurgeReport, PurgeTargetReport, SyncReport, TargetReport,
};
use crate::rule::{instance_marker, SyncRule, SyncTarget, DEFAULT_IDENTIFIER};

/// Days fetched in each direction around now.
pub const SYNC_WINDOW_DAYS: i64 = 30;

/// Attempts per mutation before it is recorded as failed.
const MUTATION_ATTEMPTS: u32 = 3;
/// Base delay between attempts, doubled each retry.
const RETRY_BASE_DELAY_MS: u64 = 500;

pub struct SyncEngine<C> {
    api: C,
    identifier: String,
    window_days: i64,
}

impl<C: CalendarApi> SyncEngine<C> {
    pub fn new(api: C) -> Self {
        Self::with_identifier(api, DEFAULT_IDENTIFIER)
    }

    /// Engine with a custom instance identifier (the `default_identifier`
    /// config setting), which namespaces all marker keys.
    pub fn with_identifier(api: C, identifier: &str) -> Self {
        SyncEngine {
            api,
            identifier: identifier.to_string(),
            window_days: SYNC_WINDOW_DAYS,
        }
    }

    /// Run one rule against all its enabled targets. A failure on one
    /// target does not abort its siblings.
    pub async fn sync_rule(&self, rule: &SyncRule, dry_run: bool) -> SyncReport {
        let mut report = SyncReport::new(&rule.id, dry_run);

        let window = TimeWindow::around_now(self.window_days);
        let source_events = match self
            .api
            .list_source_events(&rule.source_account, &rule.source_calendar_id, &window)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                // Nothing can proceed without the source listing; every
                // target reports the same failure.
                error!(rule = %rule.id, error = %e, "source fetch failed");
                for target in rule.enabled_targets() {
                    let mut target_report = TargetReport::new(&target.name, &target.calendar_id);
                    target_report.phase = ExecutionPhase::Failed {
                        error: e.to_string(),
                    };
                    report.targets.push(target_report);
                }
                return report;
            }
        };

        let (source_events, excluded) = guard::partition(source_events);
        report.loop_exclusions = excluded;
        info!(
            rule = %rule.id,
            events = source_events.len(),
            excluded,
            "source listing ready"
        );

        for target in rule.enabled_targets() {
            let target_report = self.sync_target(rule, target, &source_events, dry_run).await;
            report.targets.push(target_report);
        }

        report
    }

    async fn sync_target(
        &self,
        rule: &SyncRule,
        target: &SyncTarget,
        source_events: &[SourceEvent],
        dry_run: bool,
    ) -> TargetReport {
        let mut report = TargetReport::new(&target.name, &target.calendar_id);

        report.phase = ExecutionPhase::Fetching;
        let marker = rule.marker(&self.identifier);
        let destination_events = match self
            .api
            .list_destination_events(&target.account, &target.calendar_id, &marker)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                error!(rule = %rule.id, target = %target.name, error = %e, "destination fetch failed");
                report.phase = ExecutionPhase::Failed {
                    error: e.to_string(),
                };
                return report;
            }
        };

        report.phase = ExecutionPhase::Planning;
        let index = MatchIndex::build(destination_events, &rule.source_calendar_id);
        let planner = Planner::new(rule, target, &self.identifier, Utc::now());

        let mut mutations = Vec::with_capacity(source_events.len());
        for source in source_events {
            let key = CorrelationKey {
                source_calendar_id: rule.source_calendar_id.clone(),
                source_event_id: source.id.clone(),
            };
            let outcome = index.lookup(&key);
            mutations.push(planner.plan(source, outcome.canonical));
        }

        let deletion_plan = planner.plan_deletions(source_events, &index);
        for destination_id in &deletion_plan.duplicate_cleanups {
            report.anomalies.push(Anomaly {
                kind: AnomalyKind::DuplicateCorrelation,
                detail: format!("removing stale duplicate {}", destination_id),
            });
        }
        mutations.extend(deletion_plan.mutations);

        if dry_run {
            for mutation in &mutations {
                match mutation {
                    Mutation::Create { .. } => report.counts.created += 1,
                    Mutation::Update { .. } => report.counts.updated += 1,
                    Mutation::Delete { .. } => report.counts.deleted += 1,
                    Mutation::Skip { .. } => {
                        report.counts.skipped += 1;
                        continue;
                    }
                }
                report.planned.push(mutation.describe());
            }
            report.phase = ExecutionPhase::Completed;
            return report;
        }

        report.phase = ExecutionPhase::Applying;
        for mutation in mutations {
            self.apply(&target.account, &target.calendar_id, mutation, &mut report)
                .await;
        }
        report.phase = ExecutionPhase::Completed;
        report
    }

    /// Apply one mutation, retrying recoverable failures. A mutation that
    /// still fails is recorded and the pass continues with the next event.
    async fn apply(
        &self,
        account: &str,
        calendar_id: &str,
        mutation: Mutation,
        report: &mut TargetReport,
    ) {
        match mutation {
            Mutation::Skip { .. } => report.counts.skipped += 1,
            Mutation::Create { payload } => {
                match self
                    .with_retry(|| self.api.insert_event(account, calendar_id, &payload))
                    .await
                {
                    Ok(_) => report.counts.created += 1,
                    Err(e) => {
                        record_failure(report, format!("create \"{}\": {}", payload.summary, e));
                    }
                }
            }
            Mutation::Update {
                destination_id,
                payload,
            } => {
                match self
                    .with_retry(|| {
                        self.api
                            .patch_event(account, calendar_id, &destination_id, &payload)
                    })
                    .await
                {
                    Ok(()) => report.counts.updated += 1,
                    Err(SyncError::NotFound(_)) => {
                        // Deleted out-of-band between fetch and mutation:
                        // the correlation key is no longer backed by a real
                        // event, so fall back to a create.
                        warn!(
                            destination_id = %destination_id,
                            "update target missing, recreating"
                        );
                        report.anomalies.push(Anomaly {
                            kind: AnomalyKind::UpdateTargetMissing,
                            detail: format!("{} recreated", destination_id),
                        });
                        match self
                            .with_retry(|| self.api.insert_event(account, calendar_id, &payload))
                            .await
                        {
                            Ok(_) => report.counts.created += 1,
                            Err(e) => record_failure(
                                report,
                                format!("recreate \"{}\": {}", payload.summary, e),
                            ),
                        }
                    }
                    Err(e) => {
                        record_failure(report, format!("update {}: {}", destination_id, e));
                    }
                }
            }
            Mutation::Delete { destination_id } => {
                match self
                    .with_retry(|| self.api.delete_event(account, calendar_id, &destination_id))
                    .await
                {
                    // Already gone counts as deleted.
                    Ok(()) | Err(SyncError::NotFound(_)) => report.counts.deleted += 1,
                    Err(e) => {
                        record_failure(report, format!("delete {}: {}", destination_id, e));
                    }
                }
            }
        }
    }

    /// Remove previously-synced events for one rule from all its enabled
    /// targets, series masters only.
    pub async fn purge_rule(&self, rule: &SyncRule, dry_run: bool) -> PurgeReport {
        let marker = rule.marker(&self.identifier);
        let mut report = PurgeReport::new(&rule.id, dry_run);
        for target in rule.enabled_targets() {
            report
                .targets
                .push(self.purge_target(target, &marker, dry_run).await);
        }
        report
    }

    /// Remove everything this instance ever synced, across all destination
    /// calendars referenced by the rules. Calendars shared by several rules
    /// are purged once.
    pub async fn purge_all(&self, rules: &[SyncRule], dry_run: bool) -> PurgeReport {
        let marker = instance_marker(&self.identifier);
        let mut report = PurgeReport::new("all", dry_run);
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for rule in rules {
            for target in rule.enabled_targets() {
                if !seen.insert((target.account.clone(), target.calendar_id.clone())) {
                    continue;
                }
                report
                    .targets
                    .push(self.purge_target(target, &marker, dry_run).await);
            }
        }
        report
    }

    async fn purge_target(
        &self,
        target: &SyncTarget,
        marker: &str,
        dry_run: bool,
    ) -> PurgeTargetReport {
        let mut report = PurgeTargetReport::new(&target.name, &target.calendar_id);

        report.phase = ExecutionPhase::Fetching;
        let events = match self
            .api
            .list_destination_events(&target.account, &target.calendar_id, marker)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                error!(target = %target.name, error = %e, "purge listing failed");
                report.phase = ExecutionPhase::Failed {
                    error: e.to_string(),
                };
                return report;
            }
        };

        report.phase = ExecutionPhase::Planning;
        let plan = plan_purge(&events);
        report.instances_collapsed = plan.instances_collapsed;

        if dry_run {
            report.deleted = plan.deletions.len();
            report.planned = plan
                .deletions
                .iter()
                .map(|deletion| format!("delete \"{}\"", deletion.summary))
                .collect();
            report.phase = ExecutionPhase::Completed;
            return report;
        }

        report.phase = ExecutionPhase::Applying;
        for deletion in plan.deletions {
            match self
                .with_retry(|| {
                    self.api
                        .delete_event(&target.account, &target.calendar_id, &deletion.event_id)
                })
                .await
            {
                Ok(()) | Err(SyncError::NotFound(_)) => {
                    info!(event_id = %deletion.event_id, summary = %deletion.summary, "purged");
                    report.deleted += 1;
                }
                Err(e) => {
                    error!(event_id = %deletion.event_id, error = %e, "purge delete failed");
                    report.failed += 1;
                }
            }
        }
        report.phase = ExecutionPhase::Completed;
        report
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> SyncResult<T>
    where
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_recoverable() && attempt + 1 < MUTATION_ATTEMPTS => {
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS << attempt);
                    warn!(error = %e, attempt = attempt + 1, "attempt failed, retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn record_failure(report: &mut TargetReport, detail: String) {
    error!(detail = %detail, "mutation failed after retries");
    report.counts.failed += 1;
    report.anomalies.push(Anomaly {
        kind: AnomalyKind::MutationFailed,
        detail,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{
        DestinationEvent, EventTime, RecurrenceRole, SourceEvent, Visibility,
    };
    use crate::metadata::{SyncMetadata, SYNC_VERSION};
    use crate::planner::EventPayload;
    use crate::rule::PrivacyMode;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const SOURCE_CAL: &str = "work@example.com";
    const DEST_CAL: &str = "personal@example.com";

    fn cal_key(account: &str, calendar_id: &str) -> String {
        format!("{}/{}", account, calendar_id)
    }

    #[derive(Default)]
    struct FakeCalendar {
        sources: Mutex<HashMap<String, Vec<SourceEvent>>>,
        destinations: Mutex<HashMap<String, Vec<DestinationEvent>>>,
        source_errors: Mutex<Vec<SyncError>>,
        insert_errors: Mutex<Vec<SyncError>>,
        patch_errors: Mutex<Vec<SyncError>>,
        next_id: Mutex<u64>,
    }

    impl FakeCalendar {
        fn set_source(&self, account: &str, calendar_id: &str, events: Vec<SourceEvent>) {
            self.sources
                .lock()
                .unwrap()
                .insert(cal_key(account, calendar_id), events);
        }

        fn seed_destination(&self, account: &str, calendar_id: &str, event: DestinationEvent) {
            self.destinations
                .lock()
                .unwrap()
                .entry(cal_key(account, calendar_id))
                .or_default()
                .push(event);
        }

        fn destination_events(&self, account: &str, calendar_id: &str) -> Vec<DestinationEvent> {
            self.destinations
                .lock()
                .unwrap()
                .get(&cal_key(account, calendar_id))
                .cloned()
                .unwrap_or_default()
        }

        fn stored(payload: &EventPayload, id: &str) -> DestinationEvent {
            DestinationEvent {
                id: id.to_string(),
                summary: payload.summary.clone(),
                start: payload.start.clone(),
                end: payload.end.clone(),
                recurrence: RecurrenceRole::Single,
                extended_properties: payload.extended_properties.clone(),
            }
        }
    }

    #[async_trait]
    impl CalendarApi for FakeCalendar {
        async fn list_source_events(
            &self,
            account: &str,
            calendar_id: &str,
            _window: &TimeWindow,
        ) -> SyncResult<Vec<SourceEvent>> {
            if let Some(e) = self.source_errors.lock().unwrap().pop() {
                return Err(e);
            }
            Ok(self
                .sources
                .lock()
                .unwrap()
                .get(&cal_key(account, calendar_id))
                .cloned()
                .unwrap_or_default())
        }

        async fn list_destination_events(
            &self,
            account: &str,
            calendar_id: &str,
            marker: &str,
        ) -> SyncResult<Vec<DestinationEvent>> {
            Ok(self
                .destinations
                .lock()
                .unwrap()
                .get(&cal_key(account, calendar_id))
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|event| {
                    event
                        .extended_properties
                        .get(marker)
                        .map(|value| value == "true")
                        .unwrap_or(false)
                })
                .collect())
        }

        async fn insert_event(
            &self,
            account: &str,
            calendar_id: &str,
            payload: &EventPayload,
        ) -> SyncResult<String> {
            if let Some(e) = self.insert_errors.lock().unwrap().pop() {
                return Err(e);
            }
            let id = {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                format!("dest-{}", *next)
            };
            self.destinations
                .lock()
                .unwrap()
                .entry(cal_key(account, calendar_id))
                .or_default()
                .push(Self::stored(payload, &id));
            Ok(id)
        }

        async fn patch_event(
            &self,
            account: &str,
            calendar_id: &str,
            event_id: &str,
            payload: &EventPayload,
        ) -> SyncResult<()> {
            if let Some(e) = self.patch_errors.lock().unwrap().pop() {
                return Err(e);
            }
            let mut destinations = self.destinations.lock().unwrap();
            let events = destinations
                .get_mut(&cal_key(account, calendar_id))
                .ok_or_else(|| SyncError::NotFound(event_id.to_string()))?;
            let event = events
                .iter_mut()
                .find(|event| event.id == event_id)
                .ok_or_else(|| SyncError::NotFound(event_id.to_string()))?;
            *event = Self::stored(payload, event_id);
            Ok(())
        }

        async fn delete_event(
            &self,
            account: &str,
            calendar_id: &str,
            event_id: &str,
        ) -> SyncResult<()> {
            let mut destinations = self.destinations.lock().unwrap();
            let events = destinations
                .get_mut(&cal_key(account, calendar_id))
                .ok_or_else(|| SyncError::NotFound(event_id.to_string()))?;
            let position = events
                .iter()
                .position(|event| event.id == event_id)
                .ok_or_else(|| SyncError::NotFound(event_id.to_string()))?;
            let removed = events.remove(position);
            // Deleting a series master removes its instances, like Google.
            events.retain(|event| {
                !matches!(&event.recurrence, RecurrenceRole::Instance { master_id }
                    if master_id == &removed.id)
            });
            Ok(())
        }
    }

    fn make_rule() -> SyncRule {
        SyncRule {
            id: "work_to_personal".to_string(),
            source_account: "work".to_string(),
            source_calendar_id: SOURCE_CAL.to_string(),
            source_name: "Work".to_string(),
            targets: vec![SyncTarget {
                account: "personal".to_string(),
                calendar_id: DEST_CAL.to_string(),
                name: "Personal".to_string(),
                privacy_mode: PrivacyMode::Private,
                privacy_label: "Busy".to_string(),
                show_time: false,
                title_prefix: String::new(),
                title_suffix: String::new(),
                event_color: String::new(),
                enabled: true,
            }],
        }
    }

    fn make_source_event(id: &str, summary: &str) -> SourceEvent {
        SourceEvent {
            id: id.to_string(),
            summary: summary.to_string(),
            description: None,
            location: None,
            start: EventTime::DateTime(Utc.with_ymd_and_hms(2026, 3, 20, 9, 30, 0).unwrap()),
            end: EventTime::DateTime(Utc.with_ymd_and_hms(2026, 3, 20, 10, 0, 0).unwrap()),
            visibility: Visibility::Private,
            recurrence: RecurrenceRole::Single,
            updated: Some(Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()),
            deleted: false,
            attendees: Vec::new(),
            extended_properties: HashMap::new(),
        }
    }

    /// View a synced destination event as a source event, as a rule whose
    /// source calendar is this destination would fetch it.
    fn as_source(event: &DestinationEvent) -> SourceEvent {
        SourceEvent {
            id: event.id.clone(),
            summary: event.summary.clone(),
            description: None,
            location: None,
            start: event.start.clone(),
            end: event.end.clone(),
            visibility: Visibility::Default,
            recurrence: event.recurrence.clone(),
            updated: None,
            deleted: false,
            attendees: Vec::new(),
            extended_properties: event.extended_properties.clone(),
        }
    }

    #[tokio::test]
    async fn first_pass_creates_second_pass_skips() {
        let api = FakeCalendar::default();
        api.set_source("work", SOURCE_CAL, vec![make_source_event("e1", "Team Standup")]);
        let engine = SyncEngine::new(api);
        let rule = make_rule();

        let first = engine.sync_rule(&rule, false).await;
        assert_eq!(first.totals().created, 1);
        assert_eq!(first.totals().changes(), 1);

        let stored = engine.api.destination_events("personal", DEST_CAL);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].summary, "Busy");
        let metadata = SyncMetadata::parse(&stored[0].extended_properties).unwrap();
        assert_eq!(metadata.source_event_id, "e1");
        assert_eq!(metadata.source_calendar_id, SOURCE_CAL);
        assert_eq!(metadata.sync_count, 1);

        // No source changes: the second pass is a no-op.
        let second = engine.sync_rule(&rule, false).await;
        assert_eq!(second.totals().changes(), 0);
        assert_eq!(second.totals().skipped, 1);
        assert_eq!(engine.api.destination_events("personal", DEST_CAL).len(), 1);
    }

    #[tokio::test]
    async fn source_deletion_propagates() {
        let api = FakeCalendar::default();
        api.set_source("work", SOURCE_CAL, vec![make_source_event("e1", "Team Standup")]);
        let engine = SyncEngine::new(api);
        let rule = make_rule();

        engine.sync_rule(&rule, false).await;
        assert_eq!(engine.api.destination_events("personal", DEST_CAL).len(), 1);

        engine.api.set_source("work", SOURCE_CAL, Vec::new());
        let report = engine.sync_rule(&rule, false).await;
        assert_eq!(report.totals().deleted, 1);
        assert!(engine.api.destination_events("personal", DEST_CAL).is_empty());
    }

    #[tokio::test]
    async fn synced_events_are_not_repropagated() {
        let api = FakeCalendar::default();
        api.set_source("work", SOURCE_CAL, vec![make_source_event("e1", "Team Standup")]);
        let engine = SyncEngine::new(api);

        // Rule A: work -> personal.
        engine.sync_rule(&make_rule(), false).await;
        let synced = engine.api.destination_events("personal", DEST_CAL);
        assert_eq!(synced.len(), 1);

        // Rule B: personal -> family. Its source listing now contains the
        // copy rule A just created.
        engine.api.set_source(
            "personal",
            DEST_CAL,
            synced.iter().map(as_source).collect(),
        );
        let rule_b = SyncRule {
            id: "personal_to_family".to_string(),
            source_account: "personal".to_string(),
            source_calendar_id: DEST_CAL.to_string(),
            source_name: "Personal".to_string(),
            targets: vec![SyncTarget {
                account: "personal".to_string(),
                calendar_id: "family@example.com".to_string(),
                name: "Family".to_string(),
                privacy_mode: PrivacyMode::Public,
                privacy_label: "Busy".to_string(),
                show_time: false,
                title_prefix: String::new(),
                title_suffix: String::new(),
                event_color: String::new(),
                enabled: true,
            }],
        };

        let report = engine.sync_rule(&rule_b, false).await;
        assert_eq!(report.loop_exclusions, 1);
        assert_eq!(report.totals().changes(), 0);
        assert!(engine
            .api
            .destination_events("personal", "family@example.com")
            .is_empty());
    }

    #[tokio::test]
    async fn dry_run_plans_without_mutating() {
        let api = FakeCalendar::default();
        api.set_source("work", SOURCE_CAL, vec![make_source_event("e1", "Team Standup")]);
        let engine = SyncEngine::new(api);
        let rule = make_rule();

        let dry = engine.sync_rule(&rule, true).await;
        assert_eq!(dry.totals().created, 1);
        assert_eq!(dry.targets[0].planned, vec!["create \"Busy\"".to_string()]);
        assert!(engine.api.destination_events("personal", DEST_CAL).is_empty());

        // The live run applies exactly what the dry run planned.
        let live = engine.sync_rule(&rule, false).await;
        assert_eq!(live.totals().created, dry.totals().created);
        assert_eq!(engine.api.destination_events("personal", DEST_CAL).len(), 1);
    }

    #[tokio::test]
    async fn duplicate_correlation_is_resolved_to_canonical() {
        let api = FakeCalendar::default();
        let rule = make_rule();
        let source = make_source_event("e1", "Team Standup");
        api.set_source("work", SOURCE_CAL, vec![source]);

        // Two copies of e1, as a prior partially-failed run could leave.
        for (id, hour) in [("dest-old", 8), ("dest-new", 9)] {
            let metadata = SyncMetadata {
                source_calendar_id: SOURCE_CAL.to_string(),
                source_event_id: "e1".to_string(),
                last_synced: Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap(),
                sync_count: 1,
                sync_version: SYNC_VERSION,
            };
            api.seed_destination(
                "personal",
                DEST_CAL,
                DestinationEvent {
                    id: id.to_string(),
                    summary: "Busy".to_string(),
                    start: EventTime::DateTime(
                        Utc.with_ymd_and_hms(2026, 3, 20, 9, 30, 0).unwrap(),
                    ),
                    end: EventTime::DateTime(Utc.with_ymd_and_hms(2026, 3, 20, 10, 0, 0).unwrap()),
                    recurrence: RecurrenceRole::Single,
                    extended_properties: metadata
                        .to_properties("calsinki_synced", "calsinki_work_to_personal_synced"),
                },
            );
        }

        let engine = SyncEngine::new(api);
        let report = engine.sync_rule(&rule, false).await;

        assert_eq!(report.targets[0].anomalies.len(), 1);
        assert_eq!(
            report.targets[0].anomalies[0].kind,
            AnomalyKind::DuplicateCorrelation
        );
        assert_eq!(report.totals().deleted, 1);

        let remaining = engine.api.destination_events("personal", DEST_CAL);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "dest-new");
    }

    #[tokio::test]
    async fn missing_update_target_falls_back_to_create() {
        let api = FakeCalendar::default();
        let mut source = make_source_event("e1", "Team Standup");
        api.set_source("work", SOURCE_CAL, vec![source.clone()]);
        let engine = SyncEngine::new(api);
        let rule = make_rule();

        engine.sync_rule(&rule, false).await;

        // Force an update, then have the patch hit a vanished event.
        source.updated = Some(Utc::now() + chrono::Duration::hours(1));
        engine.api.set_source("work", SOURCE_CAL, vec![source]);
        engine
            .api
            .patch_errors
            .lock()
            .unwrap()
            .push(SyncError::NotFound("dest-1".to_string()));

        let report = engine.sync_rule(&rule, false).await;
        assert_eq!(report.totals().created, 1);
        assert_eq!(report.totals().updated, 0);
        assert!(report.targets[0]
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::UpdateTargetMissing));
    }

    #[tokio::test]
    async fn rate_limited_mutation_is_retried() {
        let api = FakeCalendar::default();
        api.set_source("work", SOURCE_CAL, vec![make_source_event("e1", "Team Standup")]);
        api.insert_errors
            .lock()
            .unwrap()
            .push(SyncError::RateLimited("quota".to_string()));
        let engine = SyncEngine::new(api);

        let report = engine.sync_rule(&make_rule(), false).await;
        assert_eq!(report.totals().created, 1);
        assert_eq!(report.totals().failed, 0);
    }

    #[tokio::test]
    async fn source_fetch_failure_marks_targets_failed() {
        let api = FakeCalendar::default();
        api.source_errors
            .lock()
            .unwrap()
            .push(SyncError::Transport("connection reset".to_string()));
        let engine = SyncEngine::new(api);

        let report = engine.sync_rule(&make_rule(), false).await;
        assert!(report.failed());
        assert!(report.targets[0].failed());
    }

    #[tokio::test]
    async fn foreign_events_survive_the_sweep() {
        let api = FakeCalendar::default();
        api.set_source("work", SOURCE_CAL, Vec::new());

        // Carries a marker (so the listing returns it) but its metadata is
        // malformed: conservative classification treats it as foreign.
        let mut props = HashMap::new();
        props.insert("calsinki_work_to_personal_synced".to_string(), "true".to_string());
        props.insert("source_calendar_id".to_string(), SOURCE_CAL.to_string());
        props.insert("source_event_id".to_string(), "e1".to_string());
        props.insert("last_synced".to_string(), "garbage".to_string());
        api.seed_destination(
            "personal",
            DEST_CAL,
            DestinationEvent {
                id: "user-owned".to_string(),
                summary: "Dentist".to_string(),
                start: EventTime::DateTime(Utc.with_ymd_and_hms(2026, 3, 20, 9, 0, 0).unwrap()),
                end: EventTime::DateTime(Utc.with_ymd_and_hms(2026, 3, 20, 9, 30, 0).unwrap()),
                recurrence: RecurrenceRole::Single,
                extended_properties: props,
            },
        );

        let engine = SyncEngine::new(api);
        let report = engine.sync_rule(&make_rule(), false).await;
        assert_eq!(report.totals().deleted, 0);
        assert_eq!(engine.api.destination_events("personal", DEST_CAL).len(), 1);
    }

    #[tokio::test]
    async fn purge_deletes_masters_not_instances() {
        let api = FakeCalendar::default();
        let rule = make_rule();
        let marker_props = |id: &str| {
            let metadata = SyncMetadata {
                source_calendar_id: SOURCE_CAL.to_string(),
                source_event_id: id.to_string(),
                last_synced: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
                sync_count: 1,
                sync_version: SYNC_VERSION,
            };
            metadata.to_properties("calsinki_synced", "calsinki_work_to_personal_synced")
        };

        api.seed_destination(
            "personal",
            DEST_CAL,
            DestinationEvent {
                id: "series-master".to_string(),
                summary: "Busy".to_string(),
                start: EventTime::DateTime(Utc.with_ymd_and_hms(2026, 3, 20, 9, 0, 0).unwrap()),
                end: EventTime::DateTime(Utc.with_ymd_and_hms(2026, 3, 20, 9, 30, 0).unwrap()),
                recurrence: RecurrenceRole::Master,
                extended_properties: marker_props("m1"),
            },
        );
        api.seed_destination(
            "personal",
            DEST_CAL,
            DestinationEvent {
                id: "series-inst".to_string(),
                summary: "Busy".to_string(),
                start: EventTime::DateTime(Utc.with_ymd_and_hms(2026, 3, 27, 9, 0, 0).unwrap()),
                end: EventTime::DateTime(Utc.with_ymd_and_hms(2026, 3, 27, 9, 30, 0).unwrap()),
                recurrence: RecurrenceRole::Instance {
                    master_id: "series-master".to_string(),
                },
                extended_properties: marker_props("m1"),
            },
        );
        api.seed_destination(
            "personal",
            DEST_CAL,
            DestinationEvent {
                id: "plain".to_string(),
                summary: "Busy".to_string(),
                start: EventTime::DateTime(Utc.with_ymd_and_hms(2026, 3, 21, 9, 0, 0).unwrap()),
                end: EventTime::DateTime(Utc.with_ymd_and_hms(2026, 3, 21, 9, 30, 0).unwrap()),
                recurrence: RecurrenceRole::Single,
                extended_properties: marker_props("e2"),
            },
        );

        let engine = SyncEngine::new(api);

        let dry = engine.purge_rule(&rule, true).await;
        assert_eq!(dry.total_deleted(), 2);
        assert_eq!(dry.targets[0].instances_collapsed, 1);
        assert_eq!(engine.api.destination_events("personal", DEST_CAL).len(), 3);

        let live = engine.purge_rule(&rule, false).await;
        assert_eq!(live.total_deleted(), 2);
        // Master deletion took its instance with it.
        assert!(engine.api.destination_events("personal", DEST_CAL).is_empty());
    }

    #[tokio::test]
    async fn purge_all_visits_shared_calendars_once() {
        let api = FakeCalendar::default();
        api.set_source("work", SOURCE_CAL, vec![make_source_event("e1", "Standup")]);
        let engine = SyncEngine::new(api);
        let rule = make_rule();
        engine.sync_rule(&rule, false).await;

        // A second rule targeting the same destination calendar.
        let mut sibling = make_rule();
        sibling.id = "team_to_personal".to_string();

        let report = engine
            .purge_all(&[rule, sibling], false)
            .await;
        assert_eq!(report.targets.len(), 1);
        assert_eq!(report.total_deleted(), 1);
        assert!(engine.api.destination_events("personal", DEST_CAL).is_empty());
    }
}
