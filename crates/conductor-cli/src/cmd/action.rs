use crate::output::print_json;
use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use conductor_core::control::enqueue_control_action;
use std::path::Path;
use uuid::Uuid;

#[derive(Subcommand)]
pub enum ActionSubcommand {
    /// Enqueue a runtime control action against a live orchestration
    Enqueue {
        /// Orchestration id
        #[arg(long)]
        orchestration: String,

        /// Action type (pause, resume, retry, ...)
        #[arg(long = "type")]
        action_type: String,

        /// Action payload as a JSON object
        #[arg(long, default_value = "{}")]
        payload: String,

        /// Actor recorded on the action
        #[arg(long)]
        requested_by: Option<String>,

        /// Idempotency key (default: random; retries must reuse the same key)
        #[arg(long)]
        key: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: ActionSubcommand, json: bool) -> anyhow::Result<()> {
    let store = super::open_store(root)?;
    match subcmd {
        ActionSubcommand::Enqueue {
            orchestration,
            action_type,
            payload,
            requested_by,
            key,
        } => {
            let key = key.unwrap_or_else(|| Uuid::new_v4().to_string());
            let action_id = enqueue_control_action(
                &store,
                &orchestration,
                &action_type,
                &payload,
                &super::requested_by(requested_by),
                &key,
                Utc::now(),
            )
            .context("enqueue failed")?;

            if json {
                print_json(&serde_json::json!({
                    "action_id": action_id,
                    "idempotency_key": key,
                }))?;
            } else {
                println!("Enqueued {action_type} action {action_id}");
            }
            Ok(())
        }
    }
}
