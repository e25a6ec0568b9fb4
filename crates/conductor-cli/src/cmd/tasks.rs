use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use conductor_core::ordering::{order_tasks_by_dependency, TaskEvent};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum TasksSubcommand {
    /// Order a JSON task list by dependency (running, then unblocked
    /// waiting, then completed)
    Order {
        /// Path to a JSON array of task events
        #[arg(long)]
        file: PathBuf,
    },
}

pub fn run(_root: &Path, subcmd: TasksSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        TasksSubcommand::Order { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let tasks: Vec<TaskEvent> =
                serde_json::from_str(&raw).context("invalid task list JSON")?;
            let ordered = order_tasks_by_dependency(&tasks);

            if json {
                return print_json(&ordered);
            }
            if ordered.is_empty() {
                println!("No tasks.");
                return Ok(());
            }
            let rows = ordered
                .iter()
                .map(|t| {
                    vec![
                        t.task_id.clone(),
                        t.subject.clone(),
                        t.status.clone(),
                        t.blocked_by.clone().unwrap_or_default(),
                    ]
                })
                .collect();
            print_table(&["ID", "SUBJECT", "STATUS", "BLOCKED BY"], rows);
            Ok(())
        }
    }
}
