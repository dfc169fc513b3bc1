//! The `Cartographer` service: backup and restore entry points.

use crate::capture::capture;
use crate::executor::{CancelToken, Executor};
use crate::live::{read_live_state, without_ignored};
use crate::lock::TenantLocks;
use crate::planner::{RestorePlan, RestorePolicy, plan};
use crate::report::RestoreReport;
use crate::resolver::resolve;
use crate::retention::enforce_retention;
use cartographer_core::{SnapshotId, TenantId, TenantSettings};
use cartographer_error::{CartographerResult, FormatError, FormatErrorKind, RestoreError, RestoreErrorKind};
use cartographer_interface::{PlatformAdapter, SettingsStore, SnapshotMetadata, SnapshotStore};
use cartographer_rate_limit::{CartographerConfig, RateLimiter, TierConfig};
use derive_getters::Getters;
use std::sync::Arc;

/// Result of a successful backup.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct BackupOutcome {
    /// The stored snapshot
    snapshot: SnapshotMetadata,
    /// Snapshots evicted to stay within quota
    evicted: Vec<SnapshotId>,
}

/// Result of a restore request.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct RestoreOutcome {
    /// The plan that was executed (or only reported, for a dry run)
    plan: RestorePlan,
    /// Per-operation outcomes
    report: RestoreReport,
}

/// Backup and restore engine for one platform credential.
///
/// Every operation on a tenant holds that tenant's lock, so capture, restore
/// and eviction never interleave. Different tenants run independently and
/// share the rate limiter.
#[derive(Clone)]
pub struct Cartographer {
    adapter: Arc<dyn PlatformAdapter>,
    snapshots: Arc<dyn SnapshotStore>,
    settings: Arc<dyn SettingsStore>,
    limiter: RateLimiter<TierConfig>,
    locks: TenantLocks,
    config: CartographerConfig,
}

impl std::fmt::Debug for Cartographer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cartographer")
            .field("adapter", &self.adapter.name())
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl Cartographer {
    /// Build a service around an adapter and stores.
    ///
    /// The limiter follows the adapter's published tier and the configured
    /// retry policy.
    pub fn new(
        adapter: Arc<dyn PlatformAdapter>,
        snapshots: Arc<dyn SnapshotStore>,
        settings: Arc<dyn SettingsStore>,
        config: CartographerConfig,
    ) -> Self {
        let limiter = RateLimiter::new(adapter.limits().tier).with_retry(config.retry);
        tracing::debug!(adapter = adapter.name(), ?limiter, "Created Cartographer service");
        Self {
            adapter,
            snapshots,
            settings,
            limiter,
            locks: TenantLocks::new(),
            config,
        }
    }

    /// The shared rate limiter.
    pub fn limiter(&self) -> &RateLimiter<TierConfig> {
        &self.limiter
    }

    /// The per-tenant locks.
    pub fn locks(&self) -> &TenantLocks {
        &self.locks
    }

    /// Settings of a tenant, created with configured defaults on first use.
    pub async fn tenant_settings(&self, tenant: &TenantId) -> CartographerResult<TenantSettings> {
        self.settings
            .settings_or_default(tenant, self.config.retention.default_max_backups)
            .await
    }

    /// Replace a tenant's settings.
    pub async fn update_settings(&self, settings: &TenantSettings) -> CartographerResult<()> {
        self.settings.save(settings).await
    }

    /// Capture the tenant's hierarchy, persist it, then enforce the quota.
    ///
    /// # Errors
    ///
    /// Fails if backups are disabled for the tenant, the capture fails (nothing
    /// is persisted), or the store fails.
    #[tracing::instrument(skip(self), fields(tenant = %tenant))]
    pub async fn backup(&self, tenant: &TenantId) -> CartographerResult<BackupOutcome> {
        let settings = self.tenant_settings(tenant).await?;
        if !settings.backups_enabled {
            return Err(RestoreError::new(RestoreErrorKind::BackupsDisabled(tenant.to_string())).into());
        }

        let guard = self.locks.lock(tenant).await;
        let snapshot = capture(self.adapter.as_ref(), &self.limiter, tenant, &settings).await?;
        let metadata = self.snapshots.put(&snapshot).await?;
        let evicted =
            enforce_retention(self.snapshots.as_ref(), &guard, *metadata.id(), &settings).await?;

        tracing::info!(snapshot = %metadata.id(), evicted = evicted.len(), "Backup complete");
        Ok(BackupOutcome {
            snapshot: metadata,
            evicted,
        })
    }

    /// Restore a stored snapshot onto the tenant's live hierarchy.
    ///
    /// Only request- and snapshot-level problems abort: backups disabled for
    /// the tenant, a missing or unreadable snapshot, a snapshot of another
    /// tenant, or a failure to read the live state.
    /// Everything else is recorded per operation in the report.
    #[tracing::instrument(skip(self, cancel), fields(tenant = %tenant, snapshot = %snapshot_id))]
    pub async fn restore(
        &self,
        tenant: &TenantId,
        snapshot_id: SnapshotId,
        policy: RestorePolicy,
        cancel: &CancelToken,
    ) -> CartographerResult<RestoreOutcome> {
        let settings = self.tenant_settings(tenant).await?;
        if !settings.backups_enabled {
            return Err(RestoreError::new(RestoreErrorKind::BackupsDisabled(tenant.to_string())).into());
        }
        let _guard = self.locks.lock(tenant).await;

        let known = self.snapshots.list(tenant).await?;
        if !known.iter().any(|m| *m.id() == snapshot_id) {
            return Err(RestoreError::new(RestoreErrorKind::SnapshotNotFound {
                tenant: tenant.to_string(),
                snapshot: snapshot_id.to_string(),
            })
            .into());
        }

        let snapshot = self.snapshots.get(tenant, snapshot_id).await?;
        if snapshot.tenant_id() != tenant {
            return Err(FormatError::new(FormatErrorKind::TenantMismatch {
                expected: tenant.to_string(),
                found: snapshot.tenant_id().to_string(),
            })
            .into());
        }

        let live = read_live_state(self.adapter.as_ref(), &self.limiter, tenant).await?;
        let live = without_ignored(live, &settings);
        let resolution = resolve(&snapshot, &live);
        let plan = plan(&snapshot, &resolution, &live, policy);

        let report = Executor::new(self.adapter.as_ref(), &self.limiter)
            .with_concurrency(self.config.execution.concurrency)
            .execute(tenant, &plan, live, cancel)
            .await;

        Ok(RestoreOutcome { plan, report })
    }

    /// Stored snapshots of a tenant, oldest first.
    pub async fn list(&self, tenant: &TenantId) -> CartographerResult<Vec<SnapshotMetadata>> {
        self.snapshots.list(tenant).await
    }

    /// Enforce the tenant's quota without capturing.
    #[tracing::instrument(skip(self), fields(tenant = %tenant))]
    pub async fn prune(&self, tenant: &TenantId) -> CartographerResult<Vec<SnapshotId>> {
        let settings = self.tenant_settings(tenant).await?;
        let guard = self.locks.lock(tenant).await;
        let newest = self.snapshots.list(tenant).await?.last().map(|m| *m.id());
        match newest {
            Some(newest) => {
                enforce_retention(self.snapshots.as_ref(), &guard, newest, &settings).await
            }
            None => Ok(Vec::new()),
        }
    }
}
