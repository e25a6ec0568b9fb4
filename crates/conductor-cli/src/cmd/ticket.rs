use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use conductor_core::store::{ControlPlaneStore, Ticket};
use std::path::Path;

#[derive(Subcommand)]
pub enum TicketSubcommand {
    /// Register a ticket under a project
    Add {
        /// Ticket id
        id: String,
        /// Owning project id
        #[arg(long)]
        project: String,
        /// Title
        #[arg(long)]
        title: String,
    },
}

pub fn run(root: &Path, subcmd: TicketSubcommand, json: bool) -> anyhow::Result<()> {
    let store = super::open_store(root)?;
    match subcmd {
        TicketSubcommand::Add { id, project, title } => {
            let ticket = Ticket {
                id,
                project_id: project,
                title,
            };
            store
                .insert_ticket(&ticket)
                .context("failed to store ticket")?;
            if json {
                print_json(&ticket)?;
            } else {
                println!("Added ticket {} (project {})", ticket.id, ticket.project_id);
            }
            Ok(())
        }
    }
}
