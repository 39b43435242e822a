mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, contract::ContractSubcommand, epic::EpicSubcommand,
    gate::GateSubcommand, story::StorySubcommand, workflow::WorkflowSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "semad",
    about = "Story-driven Dev/QA workflows: contracts, stories, epics and gates",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .semad/ or .git/)
    #[arg(long, global = true, env = "SEMAD_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize semad in the current project
    Init,

    /// Inspect and update stories
    Story {
        #[command(subcommand)]
        subcommand: StorySubcommand,
    },

    /// Epic progress and the epic loop
    Epic {
        #[command(subcommand)]
        subcommand: EpicSubcommand,
    },

    /// Validate StoryContracts
    Contract {
        #[command(subcommand)]
        subcommand: ContractSubcommand,
    },

    /// Check phase gates
    Gate {
        #[command(subcommand)]
        subcommand: GateSubcommand,
    },

    /// List, show and run workflows
    Workflow {
        #[command(subcommand)]
        subcommand: WorkflowSubcommand,
    },

    /// Show past story runs
    Runs {
        /// Only runs for this story id (e.g. 1.2)
        #[arg(long)]
        story: Option<String>,
    },

    /// Validate or show the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Epic {
            subcommand: EpicSubcommand::Run { .. },
        }
        | Commands::Workflow {
            subcommand: WorkflowSubcommand::Run { .. },
        } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Story { subcommand } => cmd::story::run(&root, subcommand, cli.json),
        Commands::Epic { subcommand } => cmd::epic::run(&root, subcommand, cli.json),
        Commands::Contract { subcommand } => cmd::contract::run(&root, subcommand, cli.json),
        Commands::Gate { subcommand } => cmd::gate::run(&root, subcommand, cli.json),
        Commands::Workflow { subcommand } => cmd::workflow::run(&root, subcommand, cli.json),
        Commands::Runs { story } => cmd::runs::run(&root, story.as_deref(), cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
