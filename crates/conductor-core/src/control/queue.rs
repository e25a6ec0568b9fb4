//! Idempotent action insertion and the guarded enqueue entry point.

use crate::control::action::{self, ControlPlaneAction, InboundQueueEntry};
use crate::error::{ConductorError, Result};
use crate::store::ControlPlaneStore;
use crate::types::ControlActionType;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Insert a control-plane action plus its node-addressed queue entry,
/// exactly once per idempotency key.
///
/// The two records and the back-reference commit as a single store write:
/// a failed call leaves no trace, so a retry rebuilds both, and no action
/// can ever exist without its queue counterpart. Safe to call arbitrarily
/// many times with the same key: a repeat call finds the first row and
/// returns its id with no further writes. If two callers race past the
/// lookup, the store's unique constraint rejects the loser, and the loser
/// re-reads and returns the winner's id.
pub fn insert_control_action<S: ControlPlaneStore>(
    store: &S,
    orchestration_id: &str,
    node_id: &str,
    action_type: ControlActionType,
    payload: &str,
    requested_by: &str,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> Result<Uuid> {
    if let Some(existing) = store.action_by_idempotency_key(idempotency_key)? {
        tracing::debug!(
            idempotency_key,
            action_id = %existing.id,
            "control action replayed, returning existing id"
        );
        return Ok(existing.id);
    }

    let mut action = ControlPlaneAction::new(
        orchestration_id,
        action_type,
        payload,
        requested_by,
        idempotency_key,
        now,
    );
    let entry = InboundQueueEntry::for_action(&action, node_id);
    action.queue_action_id = Some(entry.id);

    match store.insert_action_with_entry(&action, &entry) {
        Ok(()) => Ok(action.id),
        Err(ConductorError::DuplicateKey(_)) => {
            // Lost the insert race; the winner's row is the action.
            let winner = store
                .action_by_idempotency_key(idempotency_key)?
                .ok_or_else(|| {
                    ConductorError::Store(format!(
                        "action for key '{idempotency_key}' vanished after duplicate insert"
                    ))
                })?;
            Ok(winner.id)
        }
        Err(e) => Err(e),
    }
}

/// Generic enqueue entry point for external callers.
///
/// Enforces the runtime allow-list (`start_orchestration` is internal-only),
/// validates the payload against the schema for its kind, and resolves the
/// target node from the orchestration. Nothing is written on any failure.
pub fn enqueue_control_action<S: ControlPlaneStore>(
    store: &S,
    orchestration_id: &str,
    action_type: &str,
    payload: &str,
    requested_by: &str,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> Result<Uuid> {
    let kind = ControlActionType::parse_runtime(action_type)?;
    action::validate_payload(kind, payload)?;

    let orchestration = store.orchestration(orchestration_id)?.ok_or_else(|| {
        ConductorError::ReferenceNotFound {
            kind: "orchestration",
            id: orchestration_id.to_string(),
        }
    })?;

    insert_control_action(
        store,
        orchestration_id,
        &orchestration.node_id,
        kind,
        payload,
        requested_by,
        idempotency_key,
        now,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
