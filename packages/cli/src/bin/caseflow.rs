use caseflow_cli::logging;
use caseflow_config::ReconcileSettings;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::process;

mod cli;

#[derive(Parser)]
#[command(name = "caseflow")]
#[command(about = "Caseflow CLI - reconcile project stats and test plan membership")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recount project stats from scratch
    Recount {
        /// Tenant to operate on
        #[arg(long)]
        tenant: String,
        /// Project to recount (all projects in the tenant when omitted)
        #[arg(long)]
        project: Option<String>,
    },
    /// Remove a deleted test case from every test plan
    Cleanup {
        #[arg(long)]
        tenant: String,
        /// Id of the deleted test case
        #[arg(long = "test-case")]
        test_case: String,
    },
    /// Dispatch one serialized change event
    Replay {
        /// JSON file holding {collection, before, after}
        #[arg(long)]
        file: PathBuf,
    },
    /// Show the stats stored on a project
    Stats {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        project: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match ReconcileSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", "Configuration error:".red().bold(), e);
            process::exit(2);
        }
    };
    logging::init(settings.log_filter.as_deref());

    if let Err(e) = handle_command(cli.command, &settings).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn handle_command(command: Commands, settings: &ReconcileSettings) -> anyhow::Result<()> {
    let store = caseflow_cli::open_store(settings).await?;

    match command {
        Commands::Recount { tenant, project } => {
            cli::recount(store, settings, &tenant, project.as_deref()).await
        }
        Commands::Cleanup { tenant, test_case } => {
            cli::cleanup(store, &tenant, &test_case).await
        }
        Commands::Replay { file } => cli::replay(store, settings, &file).await,
        Commands::Stats { tenant, project } => cli::stats(store, &tenant, &project).await,
    }
}
