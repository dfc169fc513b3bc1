//! Filesystem-based snapshot and settings store.

use crate::compute_hash;
use cartographer_core::{Snapshot, SnapshotId, TenantId, TenantSettings, deserialize, serialize_pretty};
use cartographer_error::{
    CartographerResult, FormatError, FormatErrorKind, StorageError, StorageErrorKind,
};
use cartographer_interface::{SettingsStore, SnapshotMetadata, SnapshotStore};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const INDEX_FILE: &str = "index.json";
const SETTINGS_FILE: &str = "settings.json";
const SNAPSHOT_DIR: &str = "snapshots";

/// Filesystem store backend.
///
/// # Layout
///
/// ```text
/// {base_path}/
/// └── {tenant}/
///     ├── index.json          (metadata, oldest first)
///     ├── settings.json
///     └── snapshots/
///         └── {snapshot-id}.json
/// ```
///
/// Every write goes to a temp file first and is renamed into place. The
/// index carries each document's SHA-256, checked on every read.
pub struct FileSystemStore {
    base_path: PathBuf,
    // Serializes index read-modify-write cycles.
    index_lock: Mutex<()>,
}

impl FileSystemStore {
    /// Create a new filesystem store.
    ///
    /// Creates the base directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or accessed.
    #[tracing::instrument(skip(base_path))]
    pub fn new(base_path: impl Into<PathBuf>) -> CartographerResult<Self> {
        let base_path = base_path.into();

        std::fs::create_dir_all(&base_path).map_err(|e| {
            StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                "{}: {}",
                base_path.display(),
                e
            )))
        })?;

        tracing::info!(path = %base_path.display(), "Opened filesystem store");
        Ok(Self {
            base_path,
            index_lock: Mutex::new(()),
        })
    }

    /// Root directory of the store.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn tenant_dir(&self, tenant: &TenantId) -> CartographerResult<PathBuf> {
        let name = tenant.0.as_str();
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StorageError::new(StorageErrorKind::InvalidPath(format!(
                "tenant id '{}' is not a valid directory name",
                name
            )))
            .into());
        }
        Ok(self.base_path.join(name))
    }

    fn snapshot_path(&self, tenant: &TenantId, id: SnapshotId) -> CartographerResult<PathBuf> {
        Ok(self
            .tenant_dir(tenant)?
            .join(SNAPSHOT_DIR)
            .join(format!("{}.json", id)))
    }

    async fn read_index(&self, tenant: &TenantId) -> CartographerResult<Vec<SnapshotMetadata>> {
        let path = self.tenant_dir(tenant)?.join(INDEX_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StorageError::new(StorageErrorKind::FileRead(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
                .into()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StorageError::new(StorageErrorKind::FileRead(format!(
                "{}: {}",
                path.display(),
                e
            )))
            .into()),
        }
    }

    async fn write_index(
        &self,
        tenant: &TenantId,
        index: &mut [SnapshotMetadata],
    ) -> CartographerResult<()> {
        index.sort_by(|a, b| a.captured_at().cmp(b.captured_at()));
        let bytes = serde_json::to_vec_pretty(&*index).map_err(|e| {
            StorageError::new(StorageErrorKind::FileWrite(format!("index: {}", e)))
        })?;
        write_atomic(&self.tenant_dir(tenant)?.join(INDEX_FILE), &bytes).await
    }
}

async fn create_parent(path: &Path) -> CartographerResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                "{}: {}",
                parent.display(),
                e
            )))
        })?;
    }
    Ok(())
}

// Write to a temp file first, then rename for atomicity.
async fn write_atomic(path: &Path, data: &[u8]) -> CartographerResult<()> {
    create_parent(path).await?;

    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, data).await.map_err(|e| {
        StorageError::new(StorageErrorKind::FileWrite(format!(
            "{}: {}",
            temp_path.display(),
            e
        )))
    })?;

    tokio::fs::rename(&temp_path, path).await.map_err(|e| {
        StorageError::new(StorageErrorKind::FileWrite(format!(
            "rename {} to {}: {}",
            temp_path.display(),
            path.display(),
            e
        )))
    })?;
    Ok(())
}

#[async_trait::async_trait]
impl SnapshotStore for FileSystemStore {
    #[tracing::instrument(skip(self, snapshot), fields(tenant = %snapshot.tenant_id()))]
    async fn put(&self, snapshot: &Snapshot) -> CartographerResult<SnapshotMetadata> {
        let tenant = snapshot.tenant_id();
        let bytes = serialize_pretty(snapshot)?;
        let id = SnapshotId::new();
        let hash = compute_hash(&bytes);
        let path = self.snapshot_path(tenant, id)?;

        let _guard = self.index_lock.lock().await;
        write_atomic(&path, &bytes).await?;

        let metadata = SnapshotMetadata::new(id, snapshot, bytes.len() as u64, hash);
        let indexed = async {
            let mut index = self.read_index(tenant).await?;
            index.push(metadata.clone());
            self.write_index(tenant, &mut index).await
        }
        .await;
        if let Err(e) = indexed {
            // An unindexed document is unreachable, so do not leave it behind.
            if let Err(remove) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %remove, "Failed to remove unindexed snapshot");
            }
            return Err(e);
        }

        tracing::info!(
            snapshot = %id,
            path = %path.display(),
            size = bytes.len(),
            "Stored snapshot"
        );
        Ok(metadata)
    }

    #[tracing::instrument(skip(self), fields(tenant = %tenant, snapshot = %id))]
    async fn get(&self, tenant: &TenantId, id: SnapshotId) -> CartographerResult<Snapshot> {
        let index = self.read_index(tenant).await?;
        let metadata = index.iter().find(|m| *m.id() == id).ok_or_else(|| {
            StorageError::new(StorageErrorKind::NotFound(format!("{}/{}", tenant, id)))
        })?;

        let path = self.snapshot_path(tenant, id)?;
        let data = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::new(StorageErrorKind::NotFound(path.display().to_string()))
            } else {
                StorageError::new(StorageErrorKind::FileRead(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        })?;

        let actual_hash = compute_hash(&data);
        if &actual_hash != metadata.content_hash() {
            return Err(StorageError::new(StorageErrorKind::FileRead(format!(
                "Hash mismatch for {}: expected {}, got {}",
                path.display(),
                metadata.content_hash(),
                actual_hash
            )))
            .into());
        }

        let snapshot = deserialize(&data)?;
        if snapshot.tenant_id() != tenant {
            return Err(FormatError::new(FormatErrorKind::TenantMismatch {
                expected: tenant.to_string(),
                found: snapshot.tenant_id().to_string(),
            })
            .into());
        }

        tracing::debug!(size = data.len(), "Loaded snapshot");
        Ok(snapshot)
    }

    async fn list(&self, tenant: &TenantId) -> CartographerResult<Vec<SnapshotMetadata>> {
        let mut index = self.read_index(tenant).await?;
        // Stable sort keeps insertion order for equal timestamps.
        index.sort_by(|a, b| a.captured_at().cmp(b.captured_at()));
        Ok(index)
    }

    #[tracing::instrument(skip(self), fields(tenant = %tenant, snapshot = %id))]
    async fn delete(&self, tenant: &TenantId, id: SnapshotId) -> CartographerResult<()> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index(tenant).await?;
        let before = index.len();
        index.retain(|m| *m.id() != id);
        if index.len() == before {
            return Err(
                StorageError::new(StorageErrorKind::NotFound(format!("{}/{}", tenant, id))).into(),
            );
        }
        self.write_index(tenant, &mut index).await?;

        let path = self.snapshot_path(tenant, id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Snapshot file already missing");
            }
            Err(e) => {
                return Err(StorageError::new(StorageErrorKind::FileWrite(format!(
                    "delete {}: {}",
                    path.display(),
                    e
                )))
                .into());
            }
        }

        tracing::info!(path = %path.display(), "Deleted snapshot");
        Ok(())
    }
}

#[async_trait::async_trait]
impl SettingsStore for FileSystemStore {
    #[tracing::instrument(skip(self), fields(tenant = %tenant))]
    async fn load(&self, tenant: &TenantId) -> CartographerResult<Option<TenantSettings>> {
        let path = self.tenant_dir(tenant)?.join(SETTINGS_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                StorageError::new(StorageErrorKind::FileRead(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
                .into()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::new(StorageErrorKind::FileRead(format!(
                "{}: {}",
                path.display(),
                e
            )))
            .into()),
        }
    }

    #[tracing::instrument(skip(self, settings), fields(tenant = %settings.tenant_id))]
    async fn save(&self, settings: &TenantSettings) -> CartographerResult<()> {
        let path = self.tenant_dir(&settings.tenant_id)?.join(SETTINGS_FILE);
        let bytes = serde_json::to_vec_pretty(settings).map_err(|e| {
            StorageError::new(StorageErrorKind::FileWrite(format!("settings: {}", e)))
        })?;
        write_atomic(&path, &bytes).await?;
        tracing::debug!(path = %path.display(), "Saved tenant settings");
        Ok(())
    }
}
