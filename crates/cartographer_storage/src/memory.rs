//! In-memory snapshot and settings store.

use crate::compute_hash;
use cartographer_core::{Snapshot, SnapshotId, TenantId, TenantSettings, deserialize, serialize};
use cartographer_error::{
    CartographerResult, FormatError, FormatErrorKind, StorageError, StorageErrorKind,
};
use cartographer_interface::{SettingsStore, SnapshotMetadata, SnapshotStore};
use std::collections::HashMap;
use tokio::sync::RwLock;

struct StoredSnapshot {
    bytes: Vec<u8>,
    metadata: SnapshotMetadata,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    snapshots: HashMap<TenantId, HashMap<SnapshotId, StoredSnapshot>>,
    settings: HashMap<TenantId, TenantSettings>,
    next_seq: u64,
}

/// Process-local store.
///
/// Keeps encoded documents, not `Snapshot` values, so reads exercise the
/// same decode-and-validate path as durable backends.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SnapshotStore for InMemoryStore {
    #[tracing::instrument(skip(self, snapshot), fields(tenant = %snapshot.tenant_id()))]
    async fn put(&self, snapshot: &Snapshot) -> CartographerResult<SnapshotMetadata> {
        let bytes = serialize(snapshot)?;
        let id = SnapshotId::new();
        let metadata =
            SnapshotMetadata::new(id, snapshot, bytes.len() as u64, compute_hash(&bytes));

        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .snapshots
            .entry(snapshot.tenant_id().clone())
            .or_default()
            .insert(
                id,
                StoredSnapshot {
                    bytes,
                    metadata: metadata.clone(),
                    seq,
                },
            );

        tracing::debug!(snapshot = %id, "Stored snapshot in memory");
        Ok(metadata)
    }

    #[tracing::instrument(skip(self), fields(tenant = %tenant, snapshot = %id))]
    async fn get(&self, tenant: &TenantId, id: SnapshotId) -> CartographerResult<Snapshot> {
        let inner = self.inner.read().await;
        let stored = inner
            .snapshots
            .get(tenant)
            .and_then(|snapshots| snapshots.get(&id))
            .ok_or_else(|| {
                StorageError::new(StorageErrorKind::NotFound(format!("{}/{}", tenant, id)))
            })?;

        let snapshot = deserialize(&stored.bytes)?;
        if snapshot.tenant_id() != tenant {
            return Err(FormatError::new(FormatErrorKind::TenantMismatch {
                expected: tenant.to_string(),
                found: snapshot.tenant_id().to_string(),
            })
            .into());
        }
        Ok(snapshot)
    }

    async fn list(&self, tenant: &TenantId) -> CartographerResult<Vec<SnapshotMetadata>> {
        let inner = self.inner.read().await;
        let mut entries: Vec<&StoredSnapshot> = inner
            .snapshots
            .get(tenant)
            .map(|snapshots| snapshots.values().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| {
            a.metadata
                .captured_at()
                .cmp(b.metadata.captured_at())
                .then(a.seq.cmp(&b.seq))
        });
        Ok(entries.into_iter().map(|s| s.metadata.clone()).collect())
    }

    #[tracing::instrument(skip(self), fields(tenant = %tenant, snapshot = %id))]
    async fn delete(&self, tenant: &TenantId, id: SnapshotId) -> CartographerResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .snapshots
            .get_mut(tenant)
            .and_then(|snapshots| snapshots.remove(&id))
            .ok_or_else(|| {
                StorageError::new(StorageErrorKind::NotFound(format!("{}/{}", tenant, id)))
            })?;
        tracing::debug!("Deleted snapshot from memory");
        Ok(())
    }
}

#[async_trait::async_trait]
impl SettingsStore for InMemoryStore {
    async fn load(&self, tenant: &TenantId) -> CartographerResult<Option<TenantSettings>> {
        Ok(self.inner.read().await.settings.get(tenant).cloned())
    }

    async fn save(&self, settings: &TenantSettings) -> CartographerResult<()> {
        self.inner
            .write()
            .await
            .settings
            .insert(settings.tenant_id.clone(), settings.clone());
        Ok(())
    }
}
