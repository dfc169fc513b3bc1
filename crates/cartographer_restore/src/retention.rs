//! Snapshot quota enforcement.

use crate::lock::TenantGuard;
use cartographer_core::{SnapshotId, TenantSettings};
use cartographer_error::{CartographerResult, RestoreError, RestoreErrorKind};
use cartographer_interface::SnapshotStore;

/// Evict the oldest snapshots of the guarded tenant until at most
/// `settings.max_backups` remain.
///
/// `keep` (the snapshot just captured) is never evicted. Requires the
/// tenant's lock so eviction cannot race a restore reading the same records.
///
/// # Errors
///
/// Returns an error if the guard belongs to another tenant or the store fails.
/// Snapshots evicted before a store failure stay evicted.
#[tracing::instrument(skip(store, guard, settings), fields(tenant = %settings.tenant_id, max = settings.effective_max_backups()))]
pub async fn enforce_retention(
    store: &dyn SnapshotStore,
    guard: &TenantGuard,
    keep: SnapshotId,
    settings: &TenantSettings,
) -> CartographerResult<Vec<SnapshotId>> {
    if guard.tenant() != &settings.tenant_id {
        return Err(RestoreError::new(RestoreErrorKind::TenantMismatch {
            held: guard.tenant().to_string(),
            requested: settings.tenant_id.to_string(),
        })
        .into());
    }

    let max = settings.effective_max_backups();
    let listed = store.list(&settings.tenant_id).await?;
    if listed.len() <= max {
        return Ok(Vec::new());
    }

    let excess = listed.len() - max;
    let victims: Vec<SnapshotId> = listed
        .iter()
        .map(|m| *m.id())
        .filter(|id| *id != keep)
        .take(excess)
        .collect();

    for id in &victims {
        store.delete(&settings.tenant_id, *id).await?;
        tracing::debug!(snapshot = %id, "Evicted snapshot");
    }

    tracing::info!(evicted = victims.len(), remaining = listed.len() - victims.len(), "Retention enforced");
    Ok(victims)
}
