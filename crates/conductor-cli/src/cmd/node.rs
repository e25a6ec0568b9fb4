use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use conductor_core::node::{self, Node};
use conductor_core::store::ControlPlaneStore;
use std::path::Path;

#[derive(Subcommand)]
pub enum NodeSubcommand {
    /// Register an execution node (heartbeat starts now)
    Register {
        /// Node id
        id: String,
        /// Display name
        #[arg(long)]
        name: String,
    },
    /// Refresh a node's heartbeat
    Heartbeat {
        /// Node id
        id: String,
    },
    /// List nodes with liveness
    List,
}

pub fn run(root: &Path, subcmd: NodeSubcommand, json: bool) -> anyhow::Result<()> {
    let store = super::open_store(root)?;
    let now = Utc::now();
    match subcmd {
        NodeSubcommand::Register { id, name } => {
            let n = Node::new(id, name, now);
            store.upsert_node(&n).context("failed to store node")?;
            if json {
                print_json(&n)?;
            } else {
                println!("Registered node {}", n.id);
            }
            Ok(())
        }
        NodeSubcommand::Heartbeat { id } => {
            let mut n = store
                .node(&id)
                .context("failed to read node")?
                .with_context(|| format!("node not found: {id}"))?;
            n.last_heartbeat = now;
            store.upsert_node(&n).context("failed to store node")?;
            if json {
                print_json(&n)?;
            } else {
                println!("Heartbeat recorded for {}", n.id);
            }
            Ok(())
        }
        NodeSubcommand::List => {
            let nodes = store.nodes().context("failed to list nodes")?;
            if json {
                let items: Vec<serde_json::Value> = nodes
                    .iter()
                    .map(|n| {
                        serde_json::json!({
                            "id": n.id,
                            "name": n.name,
                            "last_heartbeat": n.last_heartbeat,
                            "live": node::is_live(n, now),
                        })
                    })
                    .collect();
                return print_json(&items);
            }
            if nodes.is_empty() {
                println!("No nodes registered.");
                return Ok(());
            }
            let rows = nodes
                .iter()
                .map(|n| {
                    vec![
                        n.id.clone(),
                        n.name.clone(),
                        n.last_heartbeat.to_rfc3339(),
                        if node::is_live(n, now) { "live" } else { "offline" }.to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "NAME", "LAST HEARTBEAT", "STATUS"], rows);
            Ok(())
        }
    }
}
