use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A node is considered live while its most recent heartbeat is no older
/// than this (two missed 60s heartbeats).
pub const HEARTBEAT_TIMEOUT_MS: i64 = 120_000;

/// An execution host that polls its inbound queue for control actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub last_heartbeat: DateTime<Utc>,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            last_heartbeat: now,
        }
    }
}

/// Heartbeat-threshold liveness predicate. No hysteresis: this is checked
/// once at launch validation, not monitored continuously.
pub fn is_live(node: &Node, now: DateTime<Utc>) -> bool {
    (now - node.last_heartbeat).num_milliseconds() <= HEARTBEAT_TIMEOUT_MS
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
