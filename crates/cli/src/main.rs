//! Chronarc - cron-style task scheduler
//!
//! Console entry point. Loads configuration, builds the schedule, and
//! dispatches to the subcommand handlers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;

#[derive(Parser)]
#[command(name = "chronarc", version, about = "In-process task scheduler", long_about = None)]
struct Cli {
    /// Path to the configuration file (default: probe for chronarc.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduled commands that are due
    Run {
        /// Process due events under a bounded worker pool
        #[arg(long)]
        pool: bool,
        /// The number of events to process concurrently
        #[arg(long)]
        size: Option<usize>,
    },
    /// List the scheduled commands
    List {
        /// The timezone that times should be displayed in
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Delete the cached mutex entries created by the scheduler
    ClearCache,
    /// Start the schedule worker
    Work {
        /// The file to direct `run` output to
        #[arg(long)]
        run_output_file: Option<PathBuf>,
    },
    /// Write a sample configuration file
    Init,
}

#[tokio::main]
async fn main() -> chronarc_domain::Result<()> {
    // Logging first, so .env loading is visible
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Err(e) => tracing::debug!(error = %e, "No .env file loaded"),
    }

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run { pool, size } => {
            let mut app = context::build(config_path)?;
            commands::run::handle(&mut app, pool, size).await
        }
        Commands::List { timezone } => {
            let app = context::build(config_path)?;
            commands::list::handle(&app, timezone.as_deref())
        }
        Commands::ClearCache => {
            let app = context::build(config_path)?;
            commands::clear_cache::handle(&app).await
        }
        Commands::Work { run_output_file } => {
            commands::work::handle(run_output_file.as_deref()).await
        }
        Commands::Init => commands::init::handle(),
    }
}
