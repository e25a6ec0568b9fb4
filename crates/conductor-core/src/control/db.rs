//! Persistent `ControlPlaneStore` backed by redb.
//!
//! # Table design
//!
//! Registry records (projects, designs, tickets, nodes, orchestrations) are
//! keyed by their string id. Actions are keyed by uuid bytes, with a
//! separate unique-index table `action_keys` mapping idempotency key to
//! action id; the action row, its index entry, and its inbound queue entry
//! are all written in one transaction, so the index is the unique
//! constraint and an action can never outlive a failed queue write. Queue
//! entries use a composite key:
//!
//! ```text
//! [ node_id bytes | 0x00 | created_at_ms: u64 big-endian | uuid: 16 bytes ]
//! ```
//!
//! The node id occupies the high bytes, so a single prefix range scan
//! returns one node's entries in timestamp order; only `Pending` status
//! filtering happens in application code.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::control::action::{ControlPlaneAction, InboundQueueEntry};
use crate::error::{ConductorError, Result};
use crate::node::Node;
use crate::orchestration::{LaunchEvent, Orchestration};
use crate::store::{ControlPlaneStore, Design, PolicyAttach, Project, Ticket};
use crate::types::ActionStatus;

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

/// String-id table shape shared by the registry record kinds.
type StrTable = TableDefinition<'static, &'static str, &'static [u8]>;

const PROJECTS: StrTable = TableDefinition::new("projects");
const DESIGNS: StrTable = TableDefinition::new("designs");
const TICKETS: StrTable = TableDefinition::new("tickets");
const NODES: StrTable = TableDefinition::new("nodes");
const ORCHESTRATIONS: StrTable = TableDefinition::new("orchestrations");
/// Key: uuid bytes. Value: JSON-encoded ControlPlaneAction.
const ACTIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("actions");
/// Unique index: idempotency key -> action uuid bytes.
const ACTION_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("action_keys");
/// Key: node-prefixed composite (see module docs). Value: JSON entry.
const QUEUE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("inbound_queue");
/// Key: [created_at_ms be | uuid]. Value: JSON-encoded LaunchEvent.
const LAUNCH_EVENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("launch_events");

fn store_err<E: std::fmt::Display>(e: E) -> ConductorError {
    ConductorError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn queue_key(node_id: &str, ts: DateTime<Utc>, id: Uuid) -> Vec<u8> {
    let ms = ts.timestamp_millis().max(0) as u64;
    let mut key = Vec::with_capacity(node_id.len() + 1 + 8 + 16);
    key.extend_from_slice(node_id.as_bytes());
    key.push(0x00);
    key.extend_from_slice(&ms.to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

/// Range bounds covering every queue key for one node.
fn queue_prefix_bounds(node_id: &str) -> (Vec<u8>, Vec<u8>) {
    let mut start = node_id.as_bytes().to_vec();
    start.push(0x00);
    let mut end = node_id.as_bytes().to_vec();
    end.push(0x01);
    (start, end)
}

fn event_key(ts: DateTime<Utc>, id: Uuid) -> [u8; 24] {
    let mut key = [0u8; 24];
    let ms = ts.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].copy_from_slice(id.as_bytes());
    key
}

// ---------------------------------------------------------------------------
// RedbStore
// ---------------------------------------------------------------------------

/// Disk-backed control-plane store. One write transaction per logical
/// mutation, so the dual action/index write and the conditional policy
/// patch are atomic.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the database at `path`, ensuring all tables exist.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(PROJECTS).map_err(store_err)?;
        wt.open_table(DESIGNS).map_err(store_err)?;
        wt.open_table(TICKETS).map_err(store_err)?;
        wt.open_table(NODES).map_err(store_err)?;
        wt.open_table(ORCHESTRATIONS).map_err(store_err)?;
        wt.open_table(ACTIONS).map_err(store_err)?;
        wt.open_table(ACTION_KEYS).map_err(store_err)?;
        wt.open_table(QUEUE).map_err(store_err)?;
        wt.open_table(LAUNCH_EVENTS).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    fn get_by_str_key<T: serde::de::DeserializeOwned>(
        &self,
        table: StrTable,
        id: &str,
    ) -> Result<Option<T>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(table).map_err(store_err)?;
        match table.get(id).map_err(store_err)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    fn put_by_str_key<T: serde::Serialize>(
        &self,
        table: StrTable,
        id: &str,
        record: &T,
    ) -> Result<()> {
        let value = serde_json::to_vec(record)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(table).map_err(store_err)?;
            table.insert(id, value.as_slice()).map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    fn list_by_str_key<T: serde::de::DeserializeOwned>(
        &self,
        table: StrTable,
    ) -> Result<Vec<T>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(table).map_err(store_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }
}

impl ControlPlaneStore for RedbStore {
    fn project(&self, id: &str) -> Result<Option<Project>> {
        self.get_by_str_key(PROJECTS, id)
    }

    fn design(&self, id: &str) -> Result<Option<Design>> {
        self.get_by_str_key(DESIGNS, id)
    }

    fn ticket(&self, id: &str) -> Result<Option<Ticket>> {
        self.get_by_str_key(TICKETS, id)
    }

    fn node(&self, id: &str) -> Result<Option<Node>> {
        self.get_by_str_key(NODES, id)
    }

    fn orchestration(&self, id: &str) -> Result<Option<Orchestration>> {
        self.get_by_str_key(ORCHESTRATIONS, id)
    }

    fn insert_project(&self, project: &Project) -> Result<()> {
        self.put_by_str_key(PROJECTS, &project.id, project)
    }

    fn insert_design(&self, design: &Design) -> Result<()> {
        self.put_by_str_key(DESIGNS, &design.id, design)
    }

    fn insert_ticket(&self, ticket: &Ticket) -> Result<()> {
        self.put_by_str_key(TICKETS, &ticket.id, ticket)
    }

    fn upsert_node(&self, node: &Node) -> Result<()> {
        self.put_by_str_key(NODES, &node.id, node)
    }

    fn insert_orchestration(&self, orchestration: &Orchestration) -> Result<()> {
        self.put_by_str_key(ORCHESTRATIONS, &orchestration.id, orchestration)
    }

    fn attach_policy_if_unset(
        &self,
        orchestration_id: &str,
        attach: &PolicyAttach,
    ) -> Result<bool> {
        let wt = self.db.begin_write().map_err(store_err)?;
        let attached;
        {
            let mut table = wt.open_table(ORCHESTRATIONS).map_err(store_err)?;
            let current = match table.get(orchestration_id).map_err(store_err)? {
                Some(v) => v.value().to_vec(),
                None => {
                    return Err(ConductorError::ReferenceNotFound {
                        kind: "orchestration",
                        id: orchestration_id.to_string(),
                    })
                }
            };
            let mut orch: Orchestration = serde_json::from_slice(&current)?;
            if orch.policy_snapshot.is_some() {
                attached = false;
            } else {
                orch.policy_snapshot = Some(attach.snapshot_json.clone());
                orch.policy_snapshot_hash = Some(attach.snapshot_hash.clone());
                if let Some(origin) = &attach.preset_origin {
                    orch.preset_origin = Some(origin.clone());
                }
                if let Some(design_only) = attach.design_only {
                    orch.design_only = design_only;
                }
                let updated = serde_json::to_vec(&orch)?;
                table
                    .insert(orchestration_id, updated.as_slice())
                    .map_err(store_err)?;
                attached = true;
            }
        }
        wt.commit().map_err(store_err)?;
        Ok(attached)
    }

    fn action_by_idempotency_key(&self, key: &str) -> Result<Option<ControlPlaneAction>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let keys = rt.open_table(ACTION_KEYS).map_err(store_err)?;
        let Some(id_bytes) = keys.get(key).map_err(store_err)?.map(|v| v.value().to_vec())
        else {
            return Ok(None);
        };
        let actions = rt.open_table(ACTIONS).map_err(store_err)?;
        match actions.get(id_bytes.as_slice()).map_err(store_err)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Err(ConductorError::Store(format!(
                "dangling idempotency index entry for key '{key}'"
            ))),
        }
    }

    fn insert_action_with_entry(
        &self,
        action: &ControlPlaneAction,
        entry: &InboundQueueEntry,
    ) -> Result<()> {
        let action_value = serde_json::to_vec(action)?;
        let entry_key = queue_key(&entry.node_id, entry.created_at, entry.id);
        let entry_value = serde_json::to_vec(entry)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut keys = wt.open_table(ACTION_KEYS).map_err(store_err)?;
            if keys
                .get(action.idempotency_key.as_str())
                .map_err(store_err)?
                .is_some()
            {
                // Dropping the uncommitted transaction aborts it.
                return Err(ConductorError::DuplicateKey(action.idempotency_key.clone()));
            }
            keys.insert(
                action.idempotency_key.as_str(),
                action.id.as_bytes().as_slice(),
            )
            .map_err(store_err)?;
            let mut actions = wt.open_table(ACTIONS).map_err(store_err)?;
            actions
                .insert(action.id.as_bytes().as_slice(), action_value.as_slice())
                .map_err(store_err)?;
            let mut queue = wt.open_table(QUEUE).map_err(store_err)?;
            queue
                .insert(entry_key.as_slice(), entry_value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    fn pending_entries_for_node(&self, node_id: &str) -> Result<Vec<InboundQueueEntry>> {
        let (start, end) = queue_prefix_bounds(node_id);
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(QUEUE).map_err(store_err)?;
        let mut result = Vec::new();
        for entry in table
            .range(start.as_slice()..end.as_slice())
            .map_err(store_err)?
        {
            let (_, v) = entry.map_err(store_err)?;
            let entry: InboundQueueEntry = serde_json::from_slice(v.value())?;
            if entry.status == ActionStatus::Pending {
                result.push(entry);
            }
        }
        Ok(result)
    }

    fn record_launch_event(&self, event: &LaunchEvent) -> Result<()> {
        let key = event_key(event.recorded_at, Uuid::new_v4());
        let value = serde_json::to_vec(event)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(LAUNCH_EVENTS).map_err(store_err)?;
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    fn projects(&self) -> Result<Vec<Project>> {
        self.list_by_str_key(PROJECTS)
    }

    fn nodes(&self) -> Result<Vec<Node>> {
        self.list_by_str_key(NODES)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
