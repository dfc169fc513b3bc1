//! Filesystem store maintenance handlers.

use super::commands::OutputFormat;
use cartographer::TenantId;
use cartographer::offline::{list_store, prune_store};
use std::path::Path;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// List a tenant's snapshots, oldest first.
pub async fn list_snapshots(store: &Path, tenant: &str, format: OutputFormat) -> CliResult {
    let snapshots = list_store(store, &TenantId::from(tenant)).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshots)?),
        OutputFormat::Human => {
            println!("Snapshots of tenant '{}':", tenant);
            println!("{:-<80}", "");
            for meta in &snapshots {
                let summary = meta.summary();
                println!(
                    "{}  {}  {} roles, {} groups, {} channels  {} bytes",
                    meta.id(),
                    meta.captured_at().to_rfc3339(),
                    summary.roles,
                    summary.groups,
                    summary.channels,
                    meta.size_bytes()
                );
            }
            println!("{:-<80}", "");
            println!("Total: {} snapshots", snapshots.len());
        }
    }
    Ok(())
}

/// Enforce a quota on a tenant's snapshots.
pub async fn prune_snapshots(store: &Path, tenant: &str, max: usize) -> CliResult {
    let evicted = prune_store(store, &TenantId::from(tenant), max).await?;
    for id in &evicted {
        println!("evicted {}", id);
    }
    println!("Evicted {} snapshots", evicted.len());
    Ok(())
}
