//! Handlers for commands that work on a snapshot file.

use super::commands::OutputFormat;
use cartographer::offline::{inspect, preview, read_live_file, read_snapshot, simulate};
use cartographer::{CartographerConfig, RestorePolicy};
use std::path::Path;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Validate and summarize a backup file.
pub async fn inspect_snapshot(path: &Path, format: OutputFormat) -> CliResult {
    let inspection = inspect(path).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&inspection)?),
        OutputFormat::Human => println!("{}", inspection),
    }
    Ok(())
}

/// Print the plan and its diagnostics.
pub async fn plan_restore(
    snapshot: &Path,
    live: &Path,
    delete_existing: bool,
    format: OutputFormat,
) -> CliResult {
    let snapshot = read_snapshot(snapshot).await?;
    let live = read_live_file(live).await?;
    let policy = RestorePolicy {
        delete_existing,
        dry_run: true,
    };
    let plan = preview(&snapshot, &live, policy)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        OutputFormat::Human => {
            println!("Restore plan for tenant '{}':", snapshot.tenant_id());
            println!("{:-<80}", "");
            for (index, op) in plan.operations().iter().enumerate() {
                println!("{:>4}  [{}] {}", index, op.barrier(), op);
            }
            if !plan.diagnostics().is_empty() {
                println!("{:-<80}", "");
                for diagnostic in plan.diagnostics() {
                    println!("warning: {}", diagnostic);
                }
            }
            println!("{:-<80}", "");
            println!("Total: {} operations", plan.len());
        }
    }
    Ok(())
}

/// Execute the plan on an in-memory copy and print the report.
///
/// Exits with status 2 when any operation did not succeed.
pub async fn simulate_restore(
    config: &CartographerConfig,
    snapshot: &Path,
    live: &Path,
    delete_existing: bool,
    out: Option<&Path>,
) -> CliResult {
    let snapshot = read_snapshot(snapshot).await?;
    let live = read_live_file(live).await?;
    let policy = RestorePolicy {
        delete_existing,
        dry_run: false,
    };
    let simulation = simulate(&snapshot, live, policy, config).await?;

    println!("{}", simulation.report);
    if let Some(out) = out {
        let json = serde_json::to_vec_pretty(&simulation.live)?;
        tokio::fs::write(out, json).await?;
        tracing::info!(path = %out.display(), "Wrote resulting live state");
    }

    if !simulation.report.is_complete() {
        std::process::exit(2);
    }
    Ok(())
}
