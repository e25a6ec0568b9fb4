//! Control-plane action queue.
//!
//! `action` holds the persisted records and per-kind payload schemas,
//! `queue` the idempotent insert path and the guarded enqueue entry point,
//! and `db` the redb-backed store used by the CLI.

pub mod action;
pub mod db;
pub mod queue;

pub use action::{ControlPlaneAction, InboundQueueEntry};
pub use db::RedbStore;
pub use queue::{enqueue_control_action, insert_control_action};
