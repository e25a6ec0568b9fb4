//! Orchestration launch coordination.
//!
//! `launch_orchestration` validates every cross-entity reference before a
//! single write happens, freezes the policy snapshot, creates the run
//! record, and enqueues the internal `start_orchestration` action.
//! `start_orchestration` is the attach path for a pre-existing run stub:
//! policy fields are write-once, while launch intents may be retried with
//! fresh idempotency keys.

use crate::control::action::LaunchPayload;
use crate::control::queue::insert_control_action;
use crate::error::{ConductorError, Result};
use crate::node;
use crate::orchestration::{LaunchEvent, Orchestration};
use crate::policy::{self, PolicySnapshot};
use crate::store::{ControlPlaneStore, PolicyAttach};
use crate::types::{ControlActionType, OrchestrationStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub project_id: String,
    pub design_id: String,
    pub node_id: String,
    pub feature: String,
    pub branch: String,
    pub total_phases: u32,
    pub ticket_ids: Vec<String>,
    pub policy_preset: String,
    pub policy_overrides_json: Option<String>,
    pub requested_by: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub orchestration_id: String,
    pub action_id: Uuid,
}

/// Launch a new orchestration.
///
/// Validation is fail-fast in a fixed order (project, design, node,
/// tickets, overrides); the first failure wins and a rejected launch
/// leaves zero trace in the store. A retry carrying the same idempotency
/// key replays the committed outcome, orchestration record included, with
/// no further writes.
pub fn launch_orchestration<S: ControlPlaneStore>(
    store: &S,
    req: &LaunchRequest,
    now: DateTime<Utc>,
) -> Result<LaunchOutcome> {
    if let Some(existing) = store.action_by_idempotency_key(&req.idempotency_key)? {
        tracing::debug!(
            idempotency_key = %req.idempotency_key,
            orchestration_id = %existing.orchestration_id,
            "launch replayed, returning committed outcome"
        );
        return Ok(LaunchOutcome {
            orchestration_id: existing.orchestration_id,
            action_id: existing.id,
        });
    }

    let project = store.project(&req.project_id)?.ok_or_else(|| {
        ConductorError::ReferenceNotFound {
            kind: "project",
            id: req.project_id.clone(),
        }
    })?;

    let design = store.design(&req.design_id)?.ok_or_else(|| {
        ConductorError::ReferenceNotFound {
            kind: "design",
            id: req.design_id.clone(),
        }
    })?;
    if design.project_id != req.project_id {
        return Err(ConductorError::ReferenceMismatch {
            kind: "design",
            id: req.design_id.clone(),
            expected_parent: req.project_id.clone(),
            actual_parent: design.project_id,
        });
    }

    let worker = store.node(&req.node_id)?.ok_or_else(|| {
        ConductorError::ReferenceNotFound {
            kind: "node",
            id: req.node_id.clone(),
        }
    })?;
    if !node::is_live(&worker, now) {
        return Err(ConductorError::NodeOffline {
            id: worker.id,
            last_heartbeat: worker.last_heartbeat,
        });
    }

    for ticket_id in &req.ticket_ids {
        let ticket = store.ticket(ticket_id)?.ok_or_else(|| {
            ConductorError::ReferenceNotFound {
                kind: "ticket",
                id: ticket_id.clone(),
            }
        })?;
        if ticket.project_id != req.project_id {
            return Err(ConductorError::ReferenceMismatch {
                kind: "ticket",
                id: ticket_id.clone(),
                expected_parent: req.project_id.clone(),
                actual_parent: ticket.project_id,
            });
        }
    }

    let overrides = match &req.policy_overrides_json {
        Some(json) => Some(policy::parse_overrides(json)?),
        None => None,
    };

    // Everything below is committed state; all validation is done.
    let snapshot = policy::resolve_policy(&req.policy_preset, overrides.as_ref())?;
    let snapshot_json = serde_json::to_string(&snapshot)?;
    let snapshot_hash = policy::hash_policy(&snapshot);
    let design_only = req.ticket_ids.is_empty();

    let orchestration = Orchestration {
        id: Uuid::new_v4().to_string(),
        node_id: req.node_id.clone(),
        project_id: req.project_id.clone(),
        design_id: req.design_id.clone(),
        feature_name: req.feature.clone(),
        branch: req.branch.clone(),
        total_phases: req.total_phases,
        current_phase: 1,
        status: OrchestrationStatus::Launching,
        started_at: now,
        policy_snapshot: Some(snapshot_json),
        policy_snapshot_hash: Some(snapshot_hash),
        preset_origin: Some(req.policy_preset.clone()),
        design_only,
    };
    store.insert_orchestration(&orchestration)?;

    let payload = LaunchPayload {
        feature: req.feature.clone(),
        design_id: req.design_id.clone(),
        cwd: project.workdir.clone(),
        branch: req.branch.clone(),
        total_phases: req.total_phases,
        policy: snapshot,
    };
    let action_id = insert_control_action(
        store,
        &orchestration.id,
        &req.node_id,
        ControlActionType::StartOrchestration,
        &serde_json::to_string(&payload)?,
        &req.requested_by,
        &req.idempotency_key,
        now,
    )?;

    record_event(
        store,
        &orchestration.id,
        format!(
            "{} launched '{}' on node {} ({} phases, preset {})",
            req.requested_by, req.feature, req.node_id, req.total_phases, req.policy_preset
        ),
        now,
    );

    Ok(LaunchOutcome {
        orchestration_id: orchestration.id,
        action_id,
    })
}

/// Attach a frozen policy to an existing orchestration stub and enqueue a
/// fresh `start_orchestration` action.
///
/// The policy patch applies only if the fields are currently unset; a
/// second call with a different snapshot silently keeps the committed one.
/// Action idempotency is independent: each new idempotency key produces a
/// new action carrying the committed policy.
#[allow(clippy::too_many_arguments)]
pub fn start_orchestration<S: ControlPlaneStore>(
    store: &S,
    orchestration_id: &str,
    node_id: &str,
    policy_snapshot_json: &str,
    policy_snapshot_hash: &str,
    preset_origin: Option<&str>,
    design_only: Option<bool>,
    requested_by: &str,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> Result<Uuid> {
    if store.orchestration(orchestration_id)?.is_none() {
        return Err(ConductorError::ReferenceNotFound {
            kind: "orchestration",
            id: orchestration_id.to_string(),
        });
    }

    let attach = PolicyAttach {
        snapshot_json: policy_snapshot_json.to_string(),
        snapshot_hash: policy_snapshot_hash.to_string(),
        preset_origin: preset_origin.map(str::to_string),
        design_only,
    };
    let attached = store.attach_policy_if_unset(orchestration_id, &attach)?;
    if !attached {
        tracing::debug!(orchestration_id, "policy already frozen, attach skipped");
    }

    // The committed snapshot, not the caller's argument, rides in the
    // payload: on a retried launch intent the first commit wins.
    let orchestration = store.orchestration(orchestration_id)?.ok_or_else(|| {
        ConductorError::ReferenceNotFound {
            kind: "orchestration",
            id: orchestration_id.to_string(),
        }
    })?;
    let committed_json = orchestration.policy_snapshot.as_deref().unwrap_or(policy_snapshot_json);
    let snapshot: PolicySnapshot = serde_json::from_str(committed_json)?;

    let cwd = store
        .project(&orchestration.project_id)?
        .map(|p| p.workdir)
        .unwrap_or_default();
    let payload = LaunchPayload {
        feature: orchestration.feature_name.clone(),
        design_id: orchestration.design_id.clone(),
        cwd,
        branch: orchestration.branch.clone(),
        total_phases: orchestration.total_phases,
        policy: snapshot,
    };

    insert_control_action(
        store,
        orchestration_id,
        node_id,
        ControlActionType::StartOrchestration,
        &serde_json::to_string(&payload)?,
        requested_by,
        idempotency_key,
        now,
    )
}

/// Best-effort audit write. The action queue is the source of truth for
/// execution; a failed event never unwinds the committed launch.
fn record_event<S: ControlPlaneStore>(
    store: &S,
    orchestration_id: &str,
    message: String,
    now: DateTime<Utc>,
) {
    let event = LaunchEvent {
        orchestration_id: orchestration_id.to_string(),
        message,
        recorded_at: now,
    };
    if let Err(e) = store.record_launch_event(&event) {
        tracing::warn!(orchestration_id, error = %e, "launch event write failed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::action::{ControlPlaneAction, InboundQueueEntry};
    use crate::node::{Node, HEARTBEAT_TIMEOUT_MS};
    use crate::store::{Design, MemoryStore, Project, Ticket};
    use chrono::Duration;

    fn seeded_store(now: DateTime<Utc>) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_project(&Project {
                id: "p1".to_string(),
                name: "storefront".to_string(),
                workdir: "/srv/storefront".to_string(),
            })
            .unwrap();
        store
            .insert_design(&Design {
                id: "d1".to_string(),
                project_id: "p1".to_string(),
                title: "checkout flow".to_string(),
            })
            .unwrap();
        store.upsert_node(&Node::new("n1", "worker-1", now)).unwrap();
        store
            .insert_ticket(&Ticket {
                id: "t1".to_string(),
                project_id: "p1".to_string(),
                title: "add coupon support".to_string(),
            })
            .unwrap();
        store
    }

    fn request() -> LaunchRequest {
        LaunchRequest {
            project_id: "p1".to_string(),
            design_id: "d1".to_string(),
            node_id: "n1".to_string(),
            feature: "checkout-flow".to_string(),
            branch: "feat/checkout".to_string(),
            total_phases: 4,
            ticket_ids: vec!["t1".to_string()],
            policy_preset: "balanced".to_string(),
            policy_overrides_json: None,
            requested_by: "alice".to_string(),
            idempotency_key: "launch-1".to_string(),
        }
    }

    #[test]
    fn launch_creates_run_and_start_action() {
        let now = Utc::now();
        let store = seeded_store(now);
        let outcome = launch_orchestration(&store, &request(), now).unwrap();

        let orch = store
            .orchestration(&outcome.orchestration_id)
            .unwrap()
            .unwrap();
        assert_eq!(orch.status, OrchestrationStatus::Launching);
        assert_eq!(orch.current_phase, 1);
        assert!(!orch.design_only);
        assert!(orch.policy_snapshot.is_some());
        assert!(orch
            .policy_snapshot_hash
            .as_deref()
            .unwrap()
            .starts_with("sha256-"));
        assert_eq!(orch.preset_origin.as_deref(), Some("balanced"));

        let entries = store.pending_entries_for_node("n1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].control_action_id, outcome.action_id);
        assert_eq!(
            entries[0].action_type,
            ControlActionType::StartOrchestration
        );

        let payload: LaunchPayload = serde_json::from_str(&entries[0].payload).unwrap();
        assert_eq!(payload.feature, "checkout-flow");
        assert_eq!(payload.design_id, "d1");
        assert_eq!(payload.cwd, "/srv/storefront");
        assert_eq!(payload.branch, "feat/checkout");
        assert_eq!(payload.total_phases, 4);

        assert_eq!(store.launch_event_count(), 1);
    }

    #[test]
    fn design_only_iff_no_tickets() {
        let now = Utc::now();
        let store = seeded_store(now);
        let mut req = request();
        req.ticket_ids.clear();
        let outcome = launch_orchestration(&store, &req, now).unwrap();
        let orch = store
            .orchestration(&outcome.orchestration_id)
            .unwrap()
            .unwrap();
        assert!(orch.design_only);
    }

    #[test]
    fn missing_project_fails_first_with_no_writes() {
        let now = Utc::now();
        let store = seeded_store(now);
        // Node is offline too; the project check must win.
        store
            .upsert_node(&Node {
                id: "n1".to_string(),
                name: "worker-1".to_string(),
                last_heartbeat: now - Duration::milliseconds(HEARTBEAT_TIMEOUT_MS * 10),
            })
            .unwrap();
        let mut req = request();
        req.project_id = "missing".to_string();

        let err = launch_orchestration(&store, &req, now).unwrap_err();
        match err {
            ConductorError::ReferenceNotFound { kind, id } => {
                assert_eq!(kind, "project");
                assert_eq!(id, "missing");
            }
            other => panic!("expected project ReferenceNotFound, got {other:?}"),
        }
        assert_eq!(store.action_count(), 0);
        assert_eq!(store.queue_entry_count(), 0);
        assert_eq!(store.orchestration_count(), 0);
    }

    #[test]
    fn design_must_belong_to_project() {
        let now = Utc::now();
        let store = seeded_store(now);
        store
            .insert_design(&Design {
                id: "d2".to_string(),
                project_id: "other-project".to_string(),
                title: "foreign design".to_string(),
            })
            .unwrap();
        let mut req = request();
        req.design_id = "d2".to_string();

        let err = launch_orchestration(&store, &req, now).unwrap_err();
        assert!(matches!(err, ConductorError::ReferenceMismatch { kind: "design", .. }));
    }

    #[test]
    fn stale_node_is_rejected() {
        let now = Utc::now();
        let store = seeded_store(now);
        store
            .upsert_node(&Node {
                id: "n1".to_string(),
                name: "worker-1".to_string(),
                last_heartbeat: now - Duration::milliseconds(HEARTBEAT_TIMEOUT_MS + 1),
            })
            .unwrap();

        let err = launch_orchestration(&store, &request(), now).unwrap_err();
        match err {
            ConductorError::NodeOffline { id, .. } => assert_eq!(id, "n1"),
            other => panic!("expected NodeOffline, got {other:?}"),
        }
        assert_eq!(store.orchestration_count(), 0);
    }

    #[test]
    fn foreign_ticket_is_rejected() {
        let now = Utc::now();
        let store = seeded_store(now);
        store
            .insert_ticket(&Ticket {
                id: "t2".to_string(),
                project_id: "other-project".to_string(),
                title: "foreign ticket".to_string(),
            })
            .unwrap();
        let mut req = request();
        req.ticket_ids.push("t2".to_string());

        let err = launch_orchestration(&store, &req, now).unwrap_err();
        assert!(matches!(err, ConductorError::ReferenceMismatch { kind: "ticket", .. }));
        assert_eq!(store.orchestration_count(), 0);
    }

    #[test]
    fn malformed_overrides_rejected_before_writes() {
        let now = Utc::now();
        let store = seeded_store(now);
        let mut req = request();
        req.policy_overrides_json = Some("{broken".to_string());

        let err = launch_orchestration(&store, &req, now).unwrap_err();
        assert!(matches!(err, ConductorError::InvalidOverrides(_)));
        assert_eq!(store.orchestration_count(), 0);
        assert_eq!(store.action_count(), 0);
    }

    #[test]
    fn overrides_flow_into_frozen_snapshot() {
        let now = Utc::now();
        let store = seeded_store(now);
        let mut req = request();
        req.policy_overrides_json =
            Some(r#"{"model":{"reviewer":"claude-haiku-4-5"}}"#.to_string());
        let outcome = launch_orchestration(&store, &req, now).unwrap();

        let orch = store
            .orchestration(&outcome.orchestration_id)
            .unwrap()
            .unwrap();
        let snapshot: PolicySnapshot =
            serde_json::from_str(orch.policy_snapshot.as_deref().unwrap()).unwrap();
        assert_eq!(snapshot.model.reviewer, "claude-haiku-4-5");
        assert_eq!(
            orch.policy_snapshot_hash.as_deref(),
            Some(crate::policy::hash_policy(&snapshot).as_str())
        );
    }

    #[test]
    fn launch_retry_same_key_replays_committed_outcome() {
        let now = Utc::now();
        let store = seeded_store(now);
        let first = launch_orchestration(&store, &request(), now).unwrap();
        let second = launch_orchestration(&store, &request(), now).unwrap();
        // The retry replays the whole outcome: same action, same run
        // record, and no duplicate rows of any kind.
        assert_eq!(first.action_id, second.action_id);
        assert_eq!(first.orchestration_id, second.orchestration_id);
        assert_eq!(store.action_count(), 1);
        assert_eq!(store.queue_entry_count(), 1);
        assert_eq!(store.orchestration_count(), 1);
        assert_eq!(store.launch_event_count(), 1);
    }

    // -----------------------------------------------------------------------
    // start_orchestration (attach path)
    // -----------------------------------------------------------------------

    fn stub_orchestration(store: &MemoryStore, now: DateTime<Utc>) -> String {
        let orch = Orchestration {
            id: "orch-stub".to_string(),
            node_id: "n1".to_string(),
            project_id: "p1".to_string(),
            design_id: "d1".to_string(),
            feature_name: "checkout-flow".to_string(),
            branch: "feat/checkout".to_string(),
            total_phases: 4,
            current_phase: 1,
            status: OrchestrationStatus::Launching,
            started_at: now,
            policy_snapshot: None,
            policy_snapshot_hash: None,
            preset_origin: None,
            design_only: false,
        };
        store.insert_orchestration(&orch).unwrap();
        orch.id
    }

    #[test]
    fn attach_is_write_once_but_actions_are_per_key() {
        let now = Utc::now();
        let store = seeded_store(now);
        let orch_id = stub_orchestration(&store, now);

        let strict = policy::resolve_policy("strict", None).unwrap();
        let strict_json = serde_json::to_string(&strict).unwrap();
        let a1 = start_orchestration(
            &store,
            &orch_id,
            "n1",
            &strict_json,
            &policy::hash_policy(&strict),
            Some("strict"),
            Some(false),
            "alice",
            "start-1",
            now,
        )
        .unwrap();

        let fast = policy::resolve_policy("fast", None).unwrap();
        let fast_json = serde_json::to_string(&fast).unwrap();
        let a2 = start_orchestration(
            &store,
            &orch_id,
            "n1",
            &fast_json,
            &policy::hash_policy(&fast),
            Some("fast"),
            None,
            "alice",
            "start-2",
            now,
        )
        .unwrap();

        // New key, new action; committed policy unchanged.
        assert_ne!(a1, a2);
        assert_eq!(store.action_count(), 2);
        let orch = store.orchestration(&orch_id).unwrap().unwrap();
        assert_eq!(orch.policy_snapshot.as_deref(), Some(strict_json.as_str()));
        assert_eq!(orch.preset_origin.as_deref(), Some("strict"));

        // The second action's payload carries the committed (strict) policy.
        let entries = store.pending_entries_for_node("n1").unwrap();
        let second = entries.iter().find(|e| e.control_action_id == a2).unwrap();
        let payload: LaunchPayload = serde_json::from_str(&second.payload).unwrap();
        assert_eq!(payload.policy, strict);
    }

    #[test]
    fn attach_missing_orchestration_fails() {
        let now = Utc::now();
        let store = seeded_store(now);
        let err = start_orchestration(
            &store,
            "missing",
            "n1",
            "{}",
            "sha256-00",
            None,
            None,
            "alice",
            "start-1",
            now,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConductorError::ReferenceNotFound { kind: "orchestration", .. }
        ));
    }

    // -----------------------------------------------------------------------
    // Advisory event isolation
    // -----------------------------------------------------------------------

    /// Delegates everything to a `MemoryStore` but fails the advisory
    /// launch-event write.
    struct EventlessStore(MemoryStore);

    impl ControlPlaneStore for EventlessStore {
        fn project(&self, id: &str) -> crate::error::Result<Option<Project>> {
            self.0.project(id)
        }
        fn design(&self, id: &str) -> crate::error::Result<Option<Design>> {
            self.0.design(id)
        }
        fn ticket(&self, id: &str) -> crate::error::Result<Option<Ticket>> {
            self.0.ticket(id)
        }
        fn node(&self, id: &str) -> crate::error::Result<Option<Node>> {
            self.0.node(id)
        }
        fn orchestration(&self, id: &str) -> crate::error::Result<Option<Orchestration>> {
            self.0.orchestration(id)
        }
        fn insert_project(&self, p: &Project) -> crate::error::Result<()> {
            self.0.insert_project(p)
        }
        fn insert_design(&self, d: &Design) -> crate::error::Result<()> {
            self.0.insert_design(d)
        }
        fn insert_ticket(&self, t: &Ticket) -> crate::error::Result<()> {
            self.0.insert_ticket(t)
        }
        fn upsert_node(&self, n: &Node) -> crate::error::Result<()> {
            self.0.upsert_node(n)
        }
        fn insert_orchestration(&self, o: &Orchestration) -> crate::error::Result<()> {
            self.0.insert_orchestration(o)
        }
        fn attach_policy_if_unset(
            &self,
            id: &str,
            attach: &PolicyAttach,
        ) -> crate::error::Result<bool> {
            self.0.attach_policy_if_unset(id, attach)
        }
        fn action_by_idempotency_key(
            &self,
            key: &str,
        ) -> crate::error::Result<Option<ControlPlaneAction>> {
            self.0.action_by_idempotency_key(key)
        }
        fn insert_action_with_entry(
            &self,
            a: &ControlPlaneAction,
            e: &InboundQueueEntry,
        ) -> crate::error::Result<()> {
            self.0.insert_action_with_entry(a, e)
        }
        fn pending_entries_for_node(
            &self,
            node_id: &str,
        ) -> crate::error::Result<Vec<InboundQueueEntry>> {
            self.0.pending_entries_for_node(node_id)
        }
        fn record_launch_event(&self, _event: &LaunchEvent) -> crate::error::Result<()> {
            Err(ConductorError::Store("event log unavailable".to_string()))
        }
        fn projects(&self) -> crate::error::Result<Vec<Project>> {
            self.0.projects()
        }
        fn nodes(&self) -> crate::error::Result<Vec<Node>> {
            self.0.nodes()
        }
    }

    #[test]
    fn event_failure_does_not_unwind_launch() {
        let now = Utc::now();
        let store = EventlessStore(seeded_store(now));
        let outcome = launch_orchestration(&store, &request(), now).unwrap();
        assert!(store.0.orchestration(&outcome.orchestration_id).unwrap().is_some());
        assert_eq!(store.0.action_count(), 1);
        assert_eq!(store.0.launch_event_count(), 0);
    }
}
