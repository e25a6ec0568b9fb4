mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    action::ActionSubcommand, design::DesignSubcommand, launch::LaunchArgs, node::NodeSubcommand,
    project::ProjectSubcommand, queue::QueueSubcommand, tasks::TasksSubcommand,
    ticket::TicketSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "conductor",
    about = "Control plane for orchestrated delivery runs — launch, steer, and inspect them",
    version,
    propagate_version = true
)]
struct Cli {
    /// Root directory (default: auto-detect from .conductor/ or .git/)
    #[arg(long, global = true, env = "CONDUCTOR_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },

    /// Manage design documents
    Design {
        #[command(subcommand)]
        subcommand: DesignSubcommand,
    },

    /// Manage tickets
    Ticket {
        #[command(subcommand)]
        subcommand: TicketSubcommand,
    },

    /// Manage execution nodes
    Node {
        #[command(subcommand)]
        subcommand: NodeSubcommand,
    },

    /// Launch an orchestration on a node
    Launch(LaunchArgs),

    /// Submit control actions to a running orchestration
    Action {
        #[command(subcommand)]
        subcommand: ActionSubcommand,
    },

    /// Inspect the inbound node queues
    Queue {
        #[command(subcommand)]
        subcommand: QueueSubcommand,
    },

    /// Task-list utilities
    Tasks {
        #[command(subcommand)]
        subcommand: TasksSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Project { subcommand } => cmd::project::run(&root, subcommand, cli.json),
        Commands::Design { subcommand } => cmd::design::run(&root, subcommand, cli.json),
        Commands::Ticket { subcommand } => cmd::ticket::run(&root, subcommand, cli.json),
        Commands::Node { subcommand } => cmd::node::run(&root, subcommand, cli.json),
        Commands::Launch(args) => cmd::launch::run(&root, args, cli.json),
        Commands::Action { subcommand } => cmd::action::run(&root, subcommand, cli.json),
        Commands::Queue { subcommand } => cmd::queue::run(&root, subcommand, cli.json),
        Commands::Tasks { subcommand } => cmd::tasks::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
