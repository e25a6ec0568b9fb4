use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use conductor_core::store::{ControlPlaneStore, Design};
use std::path::Path;

#[derive(Subcommand)]
pub enum DesignSubcommand {
    /// Register a design document under a project
    Add {
        /// Design id
        id: String,
        /// Owning project id
        #[arg(long)]
        project: String,
        /// Title
        #[arg(long)]
        title: String,
    },
}

pub fn run(root: &Path, subcmd: DesignSubcommand, json: bool) -> anyhow::Result<()> {
    let store = super::open_store(root)?;
    match subcmd {
        DesignSubcommand::Add { id, project, title } => {
            let design = Design {
                id,
                project_id: project,
                title,
            };
            store
                .insert_design(&design)
                .context("failed to store design")?;
            if json {
                print_json(&design)?;
            } else {
                println!("Added design {} (project {})", design.id, design.project_id);
            }
            Ok(())
        }
    }
}
