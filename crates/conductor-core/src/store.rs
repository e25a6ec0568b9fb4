//! Persistence boundary.
//!
//! The coordination algorithms never talk to a database directly; they go
//! through [`ControlPlaneStore`], which exposes exactly the primitives they
//! need: point lookups by unique key, inserts, one conditional patch, and
//! an indexed scan. `MemoryStore` is the in-process implementation used by
//! unit tests and embedders; `control::db::RedbStore` persists to disk.

use crate::control::action::{ControlPlaneAction, InboundQueueEntry};
use crate::error::{ConductorError, Result};
use crate::node::Node;
use crate::orchestration::{LaunchEvent, Orchestration};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Registry records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Working directory handed to the worker as `cwd` in the launch payload.
    pub workdir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Design {
    pub id: String,
    pub project_id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub project_id: String,
    pub title: String,
}

/// Write-once policy fields for an orchestration.
#[derive(Debug, Clone)]
pub struct PolicyAttach {
    pub snapshot_json: String,
    pub snapshot_hash: String,
    pub preset_origin: Option<String>,
    pub design_only: Option<bool>,
}

// ---------------------------------------------------------------------------
// ControlPlaneStore
// ---------------------------------------------------------------------------

pub trait ControlPlaneStore {
    fn project(&self, id: &str) -> Result<Option<Project>>;
    fn design(&self, id: &str) -> Result<Option<Design>>;
    fn ticket(&self, id: &str) -> Result<Option<Ticket>>;
    fn node(&self, id: &str) -> Result<Option<Node>>;
    fn orchestration(&self, id: &str) -> Result<Option<Orchestration>>;

    fn insert_project(&self, project: &Project) -> Result<()>;
    fn insert_design(&self, design: &Design) -> Result<()>;
    fn insert_ticket(&self, ticket: &Ticket) -> Result<()>;
    /// Insert or refresh a node record (heartbeats overwrite).
    fn upsert_node(&self, node: &Node) -> Result<()>;
    fn insert_orchestration(&self, orchestration: &Orchestration) -> Result<()>;

    /// Conditional patch: set the policy fields only if `policy_snapshot`
    /// is currently unset. Returns whether the patch was applied. The
    /// check and the write happen inside one store-level critical section.
    fn attach_policy_if_unset(&self, orchestration_id: &str, attach: &PolicyAttach)
        -> Result<bool>;

    /// Indexed point lookup on the unique idempotency key.
    fn action_by_idempotency_key(&self, key: &str) -> Result<Option<ControlPlaneAction>>;
    /// Insert an action together with its inbound queue entry as one
    /// atomic write: either both rows exist afterwards or neither does.
    /// Fails with `DuplicateKey` if an action with the same idempotency
    /// key already exists (the unique-constraint guard).
    fn insert_action_with_entry(
        &self,
        action: &ControlPlaneAction,
        entry: &InboundQueueEntry,
    ) -> Result<()>;
    /// Pending queue entries addressed to one node, oldest first.
    fn pending_entries_for_node(&self, node_id: &str) -> Result<Vec<InboundQueueEntry>>;

    /// Advisory audit write. Callers may ignore failures.
    fn record_launch_event(&self, event: &LaunchEvent) -> Result<()>;

    fn projects(&self) -> Result<Vec<Project>>;
    fn nodes(&self) -> Result<Vec<Node>>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    projects: HashMap<String, Project>,
    designs: HashMap<String, Design>,
    tickets: HashMap<String, Ticket>,
    nodes: HashMap<String, Node>,
    orchestrations: HashMap<String, Orchestration>,
    actions: HashMap<Uuid, ControlPlaneAction>,
    // Unique index: idempotency key -> action id.
    action_keys: HashMap<String, Uuid>,
    queue_entries: Vec<InboundQueueEntry>,
    launch_events: Vec<LaunchEvent>,
}

/// In-memory store. The single mutex serializes every operation, so
/// check-then-insert sequences inside one trait call are race-free.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded launch events (test observability).
    pub fn launch_event_count(&self) -> usize {
        self.inner.lock().expect("store mutex").launch_events.len()
    }

    /// Total number of queue entries regardless of node or status.
    pub fn queue_entry_count(&self) -> usize {
        self.inner.lock().expect("store mutex").queue_entries.len()
    }

    /// Total number of control-plane actions.
    pub fn action_count(&self) -> usize {
        self.inner.lock().expect("store mutex").actions.len()
    }

    /// Total number of orchestration records.
    pub fn orchestration_count(&self) -> usize {
        self.inner.lock().expect("store mutex").orchestrations.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().expect("store mutex")
    }
}

impl ControlPlaneStore for MemoryStore {
    fn project(&self, id: &str) -> Result<Option<Project>> {
        Ok(self.lock().projects.get(id).cloned())
    }

    fn design(&self, id: &str) -> Result<Option<Design>> {
        Ok(self.lock().designs.get(id).cloned())
    }

    fn ticket(&self, id: &str) -> Result<Option<Ticket>> {
        Ok(self.lock().tickets.get(id).cloned())
    }

    fn node(&self, id: &str) -> Result<Option<Node>> {
        Ok(self.lock().nodes.get(id).cloned())
    }

    fn orchestration(&self, id: &str) -> Result<Option<Orchestration>> {
        Ok(self.lock().orchestrations.get(id).cloned())
    }

    fn insert_project(&self, project: &Project) -> Result<()> {
        self.lock()
            .projects
            .insert(project.id.clone(), project.clone());
        Ok(())
    }

    fn insert_design(&self, design: &Design) -> Result<()> {
        self.lock().designs.insert(design.id.clone(), design.clone());
        Ok(())
    }

    fn insert_ticket(&self, ticket: &Ticket) -> Result<()> {
        self.lock().tickets.insert(ticket.id.clone(), ticket.clone());
        Ok(())
    }

    fn upsert_node(&self, node: &Node) -> Result<()> {
        self.lock().nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    fn insert_orchestration(&self, orchestration: &Orchestration) -> Result<()> {
        self.lock()
            .orchestrations
            .insert(orchestration.id.clone(), orchestration.clone());
        Ok(())
    }

    fn attach_policy_if_unset(
        &self,
        orchestration_id: &str,
        attach: &PolicyAttach,
    ) -> Result<bool> {
        let mut inner = self.lock();
        let orch = inner.orchestrations.get_mut(orchestration_id).ok_or_else(|| {
            ConductorError::ReferenceNotFound {
                kind: "orchestration",
                id: orchestration_id.to_string(),
            }
        })?;
        if orch.policy_snapshot.is_some() {
            return Ok(false);
        }
        orch.policy_snapshot = Some(attach.snapshot_json.clone());
        orch.policy_snapshot_hash = Some(attach.snapshot_hash.clone());
        if let Some(origin) = &attach.preset_origin {
            orch.preset_origin = Some(origin.clone());
        }
        if let Some(design_only) = attach.design_only {
            orch.design_only = design_only;
        }
        Ok(true)
    }

    fn action_by_idempotency_key(&self, key: &str) -> Result<Option<ControlPlaneAction>> {
        let inner = self.lock();
        Ok(inner
            .action_keys
            .get(key)
            .and_then(|id| inner.actions.get(id))
            .cloned())
    }

    fn insert_action_with_entry(
        &self,
        action: &ControlPlaneAction,
        entry: &InboundQueueEntry,
    ) -> Result<()> {
        let mut inner = self.lock();
        if inner.action_keys.contains_key(&action.idempotency_key) {
            return Err(ConductorError::DuplicateKey(action.idempotency_key.clone()));
        }
        inner
            .action_keys
            .insert(action.idempotency_key.clone(), action.id);
        inner.actions.insert(action.id, action.clone());
        inner.queue_entries.push(entry.clone());
        Ok(())
    }

    fn pending_entries_for_node(&self, node_id: &str) -> Result<Vec<InboundQueueEntry>> {
        let inner = self.lock();
        let mut entries: Vec<InboundQueueEntry> = inner
            .queue_entries
            .iter()
            .filter(|e| {
                e.node_id == node_id && e.status == crate::types::ActionStatus::Pending
            })
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }

    fn record_launch_event(&self, event: &LaunchEvent) -> Result<()> {
        self.lock().launch_events.push(event.clone());
        Ok(())
    }

    fn projects(&self) -> Result<Vec<Project>> {
        let mut all: Vec<Project> = self.lock().projects.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    fn nodes(&self) -> Result<Vec<Node>> {
        let mut all: Vec<Node> = self.lock().nodes.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ControlActionType;
    use chrono::Utc;

    fn action_with_entry(
        key: &str,
        kind: ControlActionType,
        node: &str,
    ) -> (ControlPlaneAction, InboundQueueEntry) {
        let mut action =
            ControlPlaneAction::new("orch-1", kind, "{}", "alice", key, Utc::now());
        let entry = InboundQueueEntry::for_action(&action, node);
        action.queue_action_id = Some(entry.id);
        (action, entry)
    }

    #[test]
    fn insert_action_with_entry_enforces_unique_key() {
        let store = MemoryStore::new();
        let (a, ea) = action_with_entry("key-1", ControlActionType::Pause, "n1");
        store.insert_action_with_entry(&a, &ea).unwrap();

        let (b, eb) = action_with_entry("key-1", ControlActionType::Resume, "n1");
        let err = store.insert_action_with_entry(&b, &eb).unwrap_err();
        assert!(matches!(err, ConductorError::DuplicateKey(_)));
        // The losing call wrote nothing, not even its queue entry.
        assert_eq!(store.action_count(), 1);
        assert_eq!(store.queue_entry_count(), 1);
    }

    #[test]
    fn attach_policy_is_write_once() {
        let store = MemoryStore::new();
        let orch = Orchestration {
            id: "orch-1".to_string(),
            node_id: "n1".to_string(),
            project_id: "p1".to_string(),
            design_id: "d1".to_string(),
            feature_name: "feat".to_string(),
            branch: "main".to_string(),
            total_phases: 3,
            current_phase: 1,
            status: crate::types::OrchestrationStatus::Launching,
            started_at: Utc::now(),
            policy_snapshot: None,
            policy_snapshot_hash: None,
            preset_origin: None,
            design_only: false,
        };
        store.insert_orchestration(&orch).unwrap();

        let first = PolicyAttach {
            snapshot_json: "{\"a\":1}".to_string(),
            snapshot_hash: "sha256-aa".to_string(),
            preset_origin: Some("strict".to_string()),
            design_only: Some(true),
        };
        assert!(store.attach_policy_if_unset("orch-1", &first).unwrap());

        let second = PolicyAttach {
            snapshot_json: "{\"a\":2}".to_string(),
            snapshot_hash: "sha256-bb".to_string(),
            preset_origin: None,
            design_only: None,
        };
        assert!(!store.attach_policy_if_unset("orch-1", &second).unwrap());

        let stored = store.orchestration("orch-1").unwrap().unwrap();
        assert_eq!(stored.policy_snapshot.as_deref(), Some("{\"a\":1}"));
        assert_eq!(stored.policy_snapshot_hash.as_deref(), Some("sha256-aa"));
        assert_eq!(stored.preset_origin.as_deref(), Some("strict"));
        assert!(stored.design_only);
    }

    #[test]
    fn attach_policy_missing_orchestration() {
        let store = MemoryStore::new();
        let attach = PolicyAttach {
            snapshot_json: "{}".to_string(),
            snapshot_hash: "sha256-aa".to_string(),
            preset_origin: None,
            design_only: None,
        };
        assert!(store.attach_policy_if_unset("missing", &attach).is_err());
    }

    #[test]
    fn pending_entries_filtered_by_node_and_status() {
        let store = MemoryStore::new();
        let (a1, e1) = action_with_entry("key-1", ControlActionType::Pause, "n1");
        let (a2, mut e2) = action_with_entry("key-2", ControlActionType::Resume, "n1");
        e2.status = crate::types::ActionStatus::Completed;
        let (a3, e3) = action_with_entry("key-3", ControlActionType::Pause, "n2");
        store.insert_action_with_entry(&a1, &e1).unwrap();
        store.insert_action_with_entry(&a2, &e2).unwrap();
        store.insert_action_with_entry(&a3, &e3).unwrap();

        let pending = store.pending_entries_for_node("n1").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, e1.id);
        assert_eq!(store.pending_entries_for_node("n2").unwrap().len(), 1);
        assert!(store.pending_entries_for_node("n3").unwrap().is_empty());
    }
}
