//! Cartographer CLI binary.
//!
//! This binary provides offline access to Cartographer's functionality:
//! - Inspect backup files
//! - Preview and simulate restores against live-state dumps
//! - Maintain filesystem snapshot stores

use cartographer::CartographerConfig;
use cartographer::telemetry::{LogConfig, init_logging};
use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use cli::{
        Cli, Commands, inspect_snapshot, list_snapshots, plan_restore, prune_snapshots,
        simulate_restore,
    };

    // Environment first so clap's env fallbacks see it
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    init_logging(&LogConfig::new(log_level).with_json_logs(cli.json_logs))?;

    let config = match &cli.config {
        Some(path) => CartographerConfig::from_file(path)?,
        None => CartographerConfig::load()?,
    };

    match cli.command {
        Commands::Inspect { snapshot, format } => {
            inspect_snapshot(&snapshot, format).await?;
        }

        Commands::Plan {
            snapshot,
            live,
            delete_existing,
            format,
        } => {
            plan_restore(&snapshot, &live, delete_existing, format).await?;
        }

        Commands::Simulate {
            snapshot,
            live,
            delete_existing,
            out,
        } => {
            simulate_restore(&config, &snapshot, &live, delete_existing, out.as_deref()).await?;
        }

        Commands::List {
            store,
            tenant,
            format,
        } => {
            list_snapshots(&store, &tenant, format).await?;
        }

        Commands::Prune { store, tenant, max } => {
            prune_snapshots(&store, &tenant, max).await?;
        }
    }

    Ok(())
}
