//! Operations on snapshot files and stores that need no platform credential.
//!
//! These back the `cartographer` binary: inspecting a backup file, previewing
//! a restore plan against a live-state dump, simulating a restore on an
//! in-memory copy of that dump, and maintaining a filesystem store.

use cartographer_core::{
    LiveState, Snapshot, SnapshotId, SnapshotSummary, TenantId, TenantSettings, deserialize,
};
use cartographer_error::{
    CartographerResult, FormatError, FormatErrorKind, StorageError, StorageErrorKind,
};
use cartographer_interface::{AdapterLimits, SnapshotMetadata, SnapshotStore};
use cartographer_rate_limit::CartographerConfig;
use cartographer_restore::{
    CancelToken, Cartographer, MemoryPlatform, OrderingViolation, RestorePlan, RestorePolicy,
    RestoreReport, TenantLocks, enforce_retention, plan, resolve,
};
use cartographer_storage::{FileSystemStore, InMemoryStore, compute_hash};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// What a backup file contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inspection {
    /// Tenant the snapshot belongs to
    pub tenant_id: TenantId,
    /// Capture time
    pub captured_at: DateTime<Utc>,
    /// Document schema version
    pub schema_version: u32,
    /// Entity counts
    pub summary: SnapshotSummary,
    /// File size in bytes
    pub size_bytes: u64,
    /// SHA-256 of the file, lowercase hex
    pub content_hash: String,
}

impl std::fmt::Display for Inspection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Tenant:   {}", self.tenant_id)?;
        writeln!(f, "Captured: {}", self.captured_at.to_rfc3339())?;
        writeln!(f, "Schema:   v{}", self.schema_version)?;
        writeln!(
            f,
            "Contents: {} roles, {} groups, {} channels, {} overlays",
            self.summary.roles, self.summary.groups, self.summary.channels, self.summary.overlays
        )?;
        write!(f, "Size:     {} bytes (sha256 {})", self.size_bytes, self.content_hash)
    }
}

/// Outcome of a simulated restore.
#[derive(Debug, Clone)]
pub struct Simulation {
    /// The executed plan
    pub plan: RestorePlan,
    /// Per-operation outcomes
    pub report: RestoreReport,
    /// Live state after execution
    pub live: LiveState,
}

async fn read_file(path: &Path) -> CartographerResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        StorageError::new(StorageErrorKind::FileRead(format!("{}: {}", path.display(), e))).into()
    })
}

/// Read and validate a backup file.
///
/// # Errors
///
/// Fails if the file cannot be read or is not a valid snapshot.
#[tracing::instrument(fields(path = %path.display()))]
pub async fn read_snapshot(path: &Path) -> CartographerResult<Snapshot> {
    let bytes = read_file(path).await?;
    Ok(deserialize(&bytes)?)
}

/// Read a live-state dump (JSON `LiveState`).
///
/// # Errors
///
/// Fails if the file cannot be read or parsed.
#[tracing::instrument(fields(path = %path.display()))]
pub async fn read_live_file(path: &Path) -> CartographerResult<LiveState> {
    let bytes = read_file(path).await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        FormatError::new(FormatErrorKind::Parse(format!(
            "live state {}: {}",
            path.display(),
            e
        )))
        .into()
    })
}

/// Validate a backup file and describe it.
///
/// # Errors
///
/// Fails if the file cannot be read or is not a valid snapshot.
pub async fn inspect(path: &Path) -> CartographerResult<Inspection> {
    let bytes = read_file(path).await?;
    let snapshot = deserialize(&bytes)?;
    Ok(Inspection {
        tenant_id: snapshot.tenant_id().clone(),
        captured_at: *snapshot.captured_at(),
        schema_version: *snapshot.schema_version(),
        summary: snapshot.summary(),
        size_bytes: bytes.len() as u64,
        content_hash: compute_hash(&bytes),
    })
}

/// Resolve and plan a restore of `snapshot` over `live`, then verify the
/// plan's ordering.
///
/// # Errors
///
/// Returns the ordering violation if the plan is not dependency-safe.
pub fn preview(
    snapshot: &Snapshot,
    live: &LiveState,
    policy: RestorePolicy,
) -> Result<RestorePlan, OrderingViolation> {
    let resolution = resolve(snapshot, live);
    let plan = plan(snapshot, &resolution, live, policy);
    plan.check_ordering(&resolution)?;
    Ok(plan)
}

/// Restore `snapshot` onto an in-memory copy of `live`.
///
/// Runs the full service path (store, lock, resolve, plan, execute) with the
/// configured retry, concurrency and payload limits.
///
/// # Errors
///
/// Fails on request-level problems only; operation failures are in the
/// report.
#[tracing::instrument(skip_all, fields(tenant = %snapshot.tenant_id()))]
pub async fn simulate(
    snapshot: &Snapshot,
    live: LiveState,
    policy: RestorePolicy,
    config: &CartographerConfig,
) -> CartographerResult<Simulation> {
    let tenant = snapshot.tenant_id().clone();
    let tier = config
        .get_tier(None)
        .unwrap_or_else(|| AdapterLimits::default().tier);
    let platform = Arc::new(
        MemoryPlatform::new()
            .with_state(tenant.clone(), live)
            .with_limits(AdapterLimits::new(tier, config.limits.clone())),
    );
    let store = Arc::new(InMemoryStore::new());
    let metadata = store.put(snapshot).await?;

    let service = Cartographer::new(platform.clone(), store.clone(), store, config.clone());
    let outcome = service
        .restore(&tenant, *metadata.id(), policy, &CancelToken::new())
        .await?;

    Ok(Simulation {
        plan: outcome.plan().clone(),
        report: outcome.report().clone(),
        live: platform.state(&tenant),
    })
}

/// Snapshots of `tenant` in the store at `dir`, oldest first.
///
/// # Errors
///
/// Fails if the store cannot be opened or read.
pub async fn list_store(dir: &Path, tenant: &TenantId) -> CartographerResult<Vec<SnapshotMetadata>> {
    FileSystemStore::new(dir)?.list(tenant).await
}

/// Evict the oldest snapshots of `tenant` until at most `max` remain.
///
/// # Errors
///
/// Fails if the store cannot be opened or a deletion fails.
#[tracing::instrument(fields(dir = %dir.display(), tenant = %tenant))]
pub async fn prune_store(
    dir: &Path,
    tenant: &TenantId,
    max: usize,
) -> CartographerResult<Vec<SnapshotId>> {
    let store = FileSystemStore::new(dir)?;
    let Some(newest) = store.list(tenant).await?.last().map(|m| *m.id()) else {
        return Ok(Vec::new());
    };
    let locks = TenantLocks::new();
    let guard = locks.lock(tenant).await;
    let settings = TenantSettings::new(tenant.clone()).with_max_backups(max);
    enforce_retention(&store, &guard, newest, &settings).await
}
