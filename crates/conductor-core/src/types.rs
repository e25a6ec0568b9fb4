use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ControlActionType
// ---------------------------------------------------------------------------

/// The closed set of control-plane action kinds.
///
/// `StartOrchestration` is produced only by the launch coordinator; external
/// callers may submit any of the other kinds through the generic enqueue
/// entry point (see [`ControlActionType::runtime_triggerable`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlActionType {
    Pause,
    Resume,
    Retry,
    OrchestrationSetPolicy,
    OrchestrationSetRoleModel,
    TaskEdit,
    TaskInsert,
    TaskSetModel,
    StartOrchestration,
}

impl ControlActionType {
    pub fn all() -> &'static [ControlActionType] {
        &[
            ControlActionType::Pause,
            ControlActionType::Resume,
            ControlActionType::Retry,
            ControlActionType::OrchestrationSetPolicy,
            ControlActionType::OrchestrationSetRoleModel,
            ControlActionType::TaskEdit,
            ControlActionType::TaskInsert,
            ControlActionType::TaskSetModel,
            ControlActionType::StartOrchestration,
        ]
    }

    /// The allow-list for externally submitted actions.
    pub fn runtime_triggerable() -> &'static [ControlActionType] {
        &[
            ControlActionType::Pause,
            ControlActionType::Resume,
            ControlActionType::Retry,
            ControlActionType::OrchestrationSetPolicy,
            ControlActionType::OrchestrationSetRoleModel,
            ControlActionType::TaskEdit,
            ControlActionType::TaskInsert,
            ControlActionType::TaskSetModel,
        ]
    }

    pub fn is_runtime_triggerable(self) -> bool {
        Self::runtime_triggerable().contains(&self)
    }

    /// Parse an externally submitted action type against the allow-list.
    ///
    /// Rejects unknown strings and `start_orchestration` alike; the error
    /// message enumerates the permitted kinds.
    pub fn parse_runtime(s: &str) -> crate::error::Result<ControlActionType> {
        Self::runtime_triggerable()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| crate::error::ConductorError::InvalidActionType {
                submitted: s.to_string(),
                allowed: Self::runtime_triggerable()
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlActionType::Pause => "pause",
            ControlActionType::Resume => "resume",
            ControlActionType::Retry => "retry",
            ControlActionType::OrchestrationSetPolicy => "orchestration_set_policy",
            ControlActionType::OrchestrationSetRoleModel => "orchestration_set_role_model",
            ControlActionType::TaskEdit => "task_edit",
            ControlActionType::TaskInsert => "task_insert",
            ControlActionType::TaskSetModel => "task_set_model",
            ControlActionType::StartOrchestration => "start_orchestration",
        }
    }
}

impl fmt::Display for ControlActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActionStatus
// ---------------------------------------------------------------------------

/// Lifecycle state shared by control-plane actions and their queue entries.
///
/// Records are created `Pending`; the polling node drives the later
/// transitions (`Dispatched → Completed | Failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Dispatched,
    Completed,
    Failed,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Dispatched => "dispatched",
            ActionStatus::Completed => "completed",
            ActionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// OrchestrationStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    Launching,
    Executing,
    Reviewing,
    Blocked,
    Paused,
    Complete,
    Failed,
}

impl OrchestrationStatus {
    /// Active runs are the only ones a `pause` is meaningful for.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            OrchestrationStatus::Launching
                | OrchestrationStatus::Executing
                | OrchestrationStatus::Reviewing
                | OrchestrationStatus::Blocked
        )
    }
}

impl fmt::Display for OrchestrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrchestrationStatus::Launching => "launching",
            OrchestrationStatus::Executing => "executing",
            OrchestrationStatus::Reviewing => "reviewing",
            OrchestrationStatus::Blocked => "blocked",
            OrchestrationStatus::Paused => "paused",
            OrchestrationStatus::Complete => "complete",
            OrchestrationStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConductorError;

    #[test]
    fn start_orchestration_excluded_from_allow_list() {
        assert!(!ControlActionType::StartOrchestration.is_runtime_triggerable());
        assert_eq!(
            ControlActionType::runtime_triggerable().len(),
            ControlActionType::all().len() - 1
        );
    }

    #[test]
    fn parse_runtime_accepts_allow_list() {
        for t in ControlActionType::runtime_triggerable() {
            assert_eq!(ControlActionType::parse_runtime(t.as_str()).unwrap(), *t);
        }
    }

    #[test]
    fn parse_runtime_rejects_start_orchestration() {
        let err = ControlActionType::parse_runtime("start_orchestration").unwrap_err();
        match err {
            ConductorError::InvalidActionType { submitted, allowed } => {
                assert_eq!(submitted, "start_orchestration");
                assert!(allowed.contains("pause"));
                assert!(allowed.contains("task_set_model"));
                assert!(!allowed.contains("start_orchestration"));
            }
            other => panic!("expected InvalidActionType, got {other:?}"),
        }
    }

    #[test]
    fn parse_runtime_rejects_unknown() {
        assert!(ControlActionType::parse_runtime("delete_everything").is_err());
        assert!(ControlActionType::parse_runtime("").is_err());
    }

    #[test]
    fn action_type_serde_snake_case() {
        let json = serde_json::to_string(&ControlActionType::OrchestrationSetRoleModel).unwrap();
        assert_eq!(json, "\"orchestration_set_role_model\"");
    }

    #[test]
    fn active_statuses() {
        assert!(OrchestrationStatus::Launching.is_active());
        assert!(OrchestrationStatus::Blocked.is_active());
        assert!(!OrchestrationStatus::Paused.is_active());
        assert!(!OrchestrationStatus::Complete.is_active());
    }
}
