use crate::output::print_json;
use anyhow::Context;
use chrono::Utc;
use clap::Args;
use conductor_core::launch::{launch_orchestration, LaunchRequest};
use std::path::Path;
use uuid::Uuid;

#[derive(Args)]
pub struct LaunchArgs {
    /// Project id
    #[arg(long)]
    pub project: String,

    /// Design id (must belong to the project)
    #[arg(long)]
    pub design: String,

    /// Execution node id (must have a fresh heartbeat)
    #[arg(long)]
    pub node: String,

    /// Feature name for the run
    #[arg(long)]
    pub feature: String,

    /// Git branch the node works on (default: feat/<feature>)
    #[arg(long)]
    pub branch: Option<String>,

    /// Number of phases
    #[arg(long, default_value = "1")]
    pub phases: u32,

    /// Ticket ids in scope (repeatable; none means design-only)
    #[arg(long = "ticket")]
    pub tickets: Vec<String>,

    /// Policy preset
    #[arg(long, default_value = "balanced")]
    pub preset: String,

    /// Policy overrides as a JSON object
    #[arg(long)]
    pub overrides: Option<String>,

    /// Actor recorded on the launch
    #[arg(long)]
    pub requested_by: Option<String>,

    /// Idempotency key (default: random; retries must reuse the same key)
    #[arg(long)]
    pub key: Option<String>,
}

pub fn run(root: &Path, args: LaunchArgs, json: bool) -> anyhow::Result<()> {
    let store = super::open_store(root)?;
    let branch = args
        .branch
        .unwrap_or_else(|| format!("feat/{}", args.feature));
    let req = LaunchRequest {
        project_id: args.project,
        design_id: args.design,
        node_id: args.node,
        feature: args.feature,
        branch,
        total_phases: args.phases,
        ticket_ids: args.tickets,
        policy_preset: args.preset,
        policy_overrides_json: args.overrides,
        requested_by: super::requested_by(args.requested_by),
        idempotency_key: args
            .key
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
    };

    let outcome = launch_orchestration(&store, &req, Utc::now()).context("launch failed")?;
    if json {
        print_json(&serde_json::json!({
            "orchestration_id": outcome.orchestration_id,
            "action_id": outcome.action_id,
        }))?;
    } else {
        println!(
            "Launched orchestration {} (start action {})",
            outcome.orchestration_id, outcome.action_id
        );
    }
    Ok(())
}
