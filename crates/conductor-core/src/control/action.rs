//! Control-plane action records and payload schemas.
//!
//! A `ControlPlaneAction` is the externally visible record of one control
//! request; its `InboundQueueEntry` is the node-addressed counterpart the
//! worker polls for. The two are linked both ways: the queue entry carries
//! `control_action_id`, and the action is patched with `queue_action_id`
//! once the entry exists.

use crate::error::{ConductorError, Result};
use crate::policy::PolicySnapshot;
use crate::types::{ActionStatus, ControlActionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ControlPlaneAction
// ---------------------------------------------------------------------------

/// Invariant: at most one action exists per `idempotency_key`.
/// Re-submission returns the original id and performs no writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneAction {
    pub id: Uuid,
    pub orchestration_id: String,
    pub action_type: ControlActionType,
    /// JSON payload matching the schema for `action_type`.
    pub payload: String,
    pub requested_by: String,
    pub idempotency_key: String,
    pub status: ActionStatus,
    pub created_at: DateTime<Utc>,
    /// Back-reference to the inbound queue entry, set once the entry exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_action_id: Option<Uuid>,
}

impl ControlPlaneAction {
    pub fn new(
        orchestration_id: impl Into<String>,
        action_type: ControlActionType,
        payload: impl Into<String>,
        requested_by: impl Into<String>,
        idempotency_key: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            orchestration_id: orchestration_id.into(),
            action_type,
            payload: payload.into(),
            requested_by: requested_by.into(),
            idempotency_key: idempotency_key.into(),
            status: ActionStatus::Pending,
            created_at: now,
            queue_action_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// InboundQueueEntry
// ---------------------------------------------------------------------------

/// Node-addressed work item mirroring a control-plane action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundQueueEntry {
    pub id: Uuid,
    pub node_id: String,
    pub orchestration_id: String,
    pub action_type: ControlActionType,
    pub payload: String,
    pub status: ActionStatus,
    pub control_action_id: Uuid,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl InboundQueueEntry {
    pub fn for_action(action: &ControlPlaneAction, node_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_id: node_id.into(),
            orchestration_id: action.orchestration_id.clone(),
            action_type: action.action_type,
            payload: action.payload.clone(),
            status: ActionStatus::Pending,
            control_action_id: action.id,
            idempotency_key: action.idempotency_key.clone(),
            created_at: action.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Payload schemas (one per action kind)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PausePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumePayload {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryPayload {
    /// Phase to retry from; omitted means the current phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPolicyPayload {
    pub preset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<crate::policy::PolicyOverrides>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRoleModelPayload {
    pub role: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEditPayload {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInsertPayload {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSetModelPayload {
    pub task_id: String,
    pub model: String,
}

/// Payload of a `start_orchestration` action: everything the worker needs
/// to begin executing phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchPayload {
    pub feature: String,
    pub design_id: String,
    pub cwd: String,
    pub branch: String,
    pub total_phases: u32,
    pub policy: PolicySnapshot,
}

/// Validate a raw payload against the schema for its action kind.
///
/// Catches malformed payloads at the enqueue boundary instead of letting an
/// opaque string reach the worker.
pub fn validate_payload(kind: ControlActionType, raw: &str) -> Result<()> {
    fn check<'de, T: Deserialize<'de>>(
        kind: ControlActionType,
        raw: &'de str,
    ) -> Result<()> {
        serde_json::from_str::<T>(raw)
            .map(|_| ())
            .map_err(|e| ConductorError::InvalidPayload {
                action_type: kind.as_str().to_string(),
                reason: e.to_string(),
            })
    }

    match kind {
        ControlActionType::Pause => check::<PausePayload>(kind, raw),
        ControlActionType::Resume => check::<ResumePayload>(kind, raw),
        ControlActionType::Retry => check::<RetryPayload>(kind, raw),
        ControlActionType::OrchestrationSetPolicy => check::<SetPolicyPayload>(kind, raw),
        ControlActionType::OrchestrationSetRoleModel => check::<SetRoleModelPayload>(kind, raw),
        ControlActionType::TaskEdit => check::<TaskEditPayload>(kind, raw),
        ControlActionType::TaskInsert => check::<TaskInsertPayload>(kind, raw),
        ControlActionType::TaskSetModel => check::<TaskSetModelPayload>(kind, raw),
        ControlActionType::StartOrchestration => check::<LaunchPayload>(kind, raw),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_entry_mirrors_action() {
        let action = ControlPlaneAction::new(
            "orch-1",
            ControlActionType::Pause,
            r#"{"reason":"manual hold"}"#,
            "alice",
            "key-1",
            Utc::now(),
        );
        let entry = InboundQueueEntry::for_action(&action, "node-1");
        assert_eq!(entry.control_action_id, action.id);
        assert_eq!(entry.orchestration_id, "orch-1");
        assert_eq!(entry.action_type, ControlActionType::Pause);
        assert_eq!(entry.payload, action.payload);
        assert_eq!(entry.idempotency_key, "key-1");
        assert_ne!(entry.id, action.id);
    }

    #[test]
    fn validate_payload_per_kind() {
        assert!(validate_payload(ControlActionType::Pause, "{}").is_ok());
        assert!(validate_payload(ControlActionType::Pause, r#"{"reason":"hold"}"#).is_ok());
        assert!(validate_payload(ControlActionType::Retry, r#"{"phase":3}"#).is_ok());
        assert!(validate_payload(
            ControlActionType::OrchestrationSetRoleModel,
            r#"{"role":"reviewer","model":"claude-haiku-4-5"}"#
        )
        .is_ok());
        assert!(validate_payload(
            ControlActionType::TaskInsert,
            r#"{"subject":"add retries","phase":2}"#
        )
        .is_ok());
    }

    #[test]
    fn validate_payload_rejects_missing_fields() {
        let err = validate_payload(ControlActionType::TaskSetModel, r#"{"task_id":"T1"}"#)
            .unwrap_err();
        match err {
            ConductorError::InvalidPayload { action_type, .. } => {
                assert_eq!(action_type, "task_set_model");
            }
            other => panic!("expected InvalidPayload, got {other:?}"),
        }
    }

    #[test]
    fn validate_payload_rejects_malformed_json() {
        assert!(validate_payload(ControlActionType::Resume, "not json").is_err());
    }
}
