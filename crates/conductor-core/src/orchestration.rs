use crate::types::OrchestrationStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One end-to-end multi-phase automated delivery run.
///
/// Created in `Launching` by the launch coordinator; later status
/// transitions are driven by the worker node. `policy_snapshot` and
/// `policy_snapshot_hash` are write-once: first writer wins, then frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Orchestration {
    pub id: String,
    pub node_id: String,
    pub project_id: String,
    pub design_id: String,
    pub feature_name: String,
    pub branch: String,
    pub total_phases: u32,
    pub current_phase: u32,
    pub status: OrchestrationStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_snapshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_snapshot_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_origin: Option<String>,
    /// True when the run was launched with no tickets attached.
    pub design_only: bool,
}

/// Human-readable audit record for a launch. Advisory only: the action
/// queue, not this event, is the source of truth for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchEvent {
    pub orchestration_id: String,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}
