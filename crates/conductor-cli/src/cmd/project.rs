use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use conductor_core::store::{ControlPlaneStore, Project};
use std::path::Path;

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// Register a project
    Add {
        /// Project id
        id: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// Working directory handed to the node at launch
        #[arg(long)]
        workdir: String,
    },
    /// List registered projects
    List,
}

pub fn run(root: &Path, subcmd: ProjectSubcommand, json: bool) -> anyhow::Result<()> {
    let store = super::open_store(root)?;
    match subcmd {
        ProjectSubcommand::Add { id, name, workdir } => {
            let project = Project { id, name, workdir };
            store
                .insert_project(&project)
                .context("failed to store project")?;
            if json {
                print_json(&project)?;
            } else {
                println!("Added project {}", project.id);
            }
            Ok(())
        }
        ProjectSubcommand::List => {
            let projects = store.projects().context("failed to list projects")?;
            if json {
                return print_json(&projects);
            }
            if projects.is_empty() {
                println!("No projects registered.");
                return Ok(());
            }
            let rows = projects
                .iter()
                .map(|p| vec![p.id.clone(), p.name.clone(), p.workdir.clone()])
                .collect();
            print_table(&["ID", "NAME", "WORKDIR"], rows);
            Ok(())
        }
    }
}
