use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("unknown policy preset '{name}': valid presets are {valid}")]
    UnknownPreset { name: String, valid: String },

    #[error("policy overrides are not valid JSON: {0}")]
    InvalidOverrides(String),

    #[error("{kind} not found: {id}")]
    ReferenceNotFound { kind: &'static str, id: String },

    #[error("{kind} '{id}' belongs to {actual_parent}, not {expected_parent}")]
    ReferenceMismatch {
        kind: &'static str,
        id: String,
        expected_parent: String,
        actual_parent: String,
    },

    #[error("node '{id}' is offline: last heartbeat at {last_heartbeat}")]
    NodeOffline {
        id: String,
        last_heartbeat: chrono::DateTime<chrono::Utc>,
    },

    #[error("invalid action type '{submitted}': allowed types are {allowed}")]
    InvalidActionType { submitted: String, allowed: String },

    #[error("invalid payload for action '{action_type}': {reason}")]
    InvalidPayload {
        action_type: String,
        reason: String,
    },

    /// Raised by a store when a unique key already exists. The action
    /// inserter treats this as "found existing" and re-reads the winner.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConductorError>;
