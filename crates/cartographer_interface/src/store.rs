//! Snapshot and settings persistence traits.

use cartographer_core::{Snapshot, SnapshotId, SnapshotSummary, TenantId, TenantSettings};
use cartographer_error::CartographerResult;
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};

/// Listing entry for a stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct SnapshotMetadata {
    /// Store-assigned id
    id: SnapshotId,
    /// Owning tenant
    tenant_id: TenantId,
    /// Capture timestamp
    captured_at: DateTime<Utc>,
    /// Document schema version
    schema_version: u32,
    /// Entity counts
    summary: SnapshotSummary,
    /// Encoded size
    size_bytes: u64,
    /// SHA-256 of the encoded document, lowercase hex
    content_hash: String,
}

impl SnapshotMetadata {
    /// Describe a snapshot persisted under `id`.
    pub fn new(id: SnapshotId, snapshot: &Snapshot, size_bytes: u64, content_hash: String) -> Self {
        Self {
            id,
            tenant_id: snapshot.tenant_id().clone(),
            captured_at: *snapshot.captured_at(),
            schema_version: *snapshot.schema_version(),
            summary: snapshot.summary(),
            size_bytes,
            content_hash,
        }
    }
}

/// Durable snapshot records, keyed by tenant and id.
///
/// Stores only persist and return documents; they never interpret them
/// beyond the codec's validation.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot under a fresh id.
    async fn put(&self, snapshot: &Snapshot) -> CartographerResult<SnapshotMetadata>;

    /// Load and validate a snapshot.
    async fn get(&self, tenant: &TenantId, id: SnapshotId) -> CartographerResult<Snapshot>;

    /// Metadata of every snapshot of a tenant, oldest capture first.
    async fn list(&self, tenant: &TenantId) -> CartographerResult<Vec<SnapshotMetadata>>;

    /// Remove a snapshot.
    async fn delete(&self, tenant: &TenantId, id: SnapshotId) -> CartographerResult<()>;
}

/// Durable per-tenant settings.
#[async_trait::async_trait]
pub trait SettingsStore: Send + Sync {
    /// Settings of a tenant, if any were ever saved.
    async fn load(&self, tenant: &TenantId) -> CartographerResult<Option<TenantSettings>>;

    /// Create or replace a tenant's settings.
    async fn save(&self, settings: &TenantSettings) -> CartographerResult<()>;

    /// Settings of a tenant, creating and saving defaults on first use.
    async fn settings_or_default(
        &self,
        tenant: &TenantId,
        default_max_backups: usize,
    ) -> CartographerResult<TenantSettings> {
        if let Some(settings) = self.load(tenant).await? {
            return Ok(settings);
        }
        let settings = TenantSettings::new(tenant.clone()).with_max_backups(default_max_backups);
        self.save(&settings).await?;
        tracing::info!(tenant = %tenant, "Created default tenant settings");
        Ok(settings)
    }
}
