use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use conductor_core::store::ControlPlaneStore;
use std::path::Path;

#[derive(Subcommand)]
pub enum QueueSubcommand {
    /// List pending inbound queue entries for a node, oldest first
    List {
        /// Node id
        #[arg(long)]
        node: String,
    },
}

pub fn run(root: &Path, subcmd: QueueSubcommand, json: bool) -> anyhow::Result<()> {
    let store = super::open_store(root)?;
    match subcmd {
        QueueSubcommand::List { node } => {
            let entries = store
                .pending_entries_for_node(&node)
                .context("failed to read queue")?;
            if json {
                return print_json(&entries);
            }
            if entries.is_empty() {
                println!("No pending entries for node {node}.");
                return Ok(());
            }
            let rows = entries
                .iter()
                .map(|e| {
                    vec![
                        e.id.to_string(),
                        e.action_type.to_string(),
                        e.orchestration_id.clone(),
                        e.created_at.to_rfc3339(),
                    ]
                })
                .collect();
            print_table(&["ID", "TYPE", "ORCHESTRATION", "CREATED"], rows);
            Ok(())
        }
    }
}
