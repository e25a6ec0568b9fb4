pub mod action;
pub mod design;
pub mod launch;
pub mod node;
pub mod project;
pub mod queue;
pub mod tasks;
pub mod ticket;

use std::path::Path;

use anyhow::Context;
use conductor_core::control::RedbStore;

use crate::root::control_db_path;

pub fn open_store(root: &Path) -> anyhow::Result<RedbStore> {
    let path = control_db_path(root)?;
    RedbStore::open(&path).with_context(|| format!("failed to open {}", path.display()))
}

/// Actor recorded on writes: explicit flag, then `$USER`, then "cli".
pub fn requested_by(explicit: Option<String>) -> String {
    explicit
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "cli".to_string())
}
