//! Snapshot and settings stores for Cartographer.
//!
//! Two backends implement [`SnapshotStore`] and [`SettingsStore`]:
//!
//! - [`InMemoryStore`]: process-local, for tests and simulations
//! - [`FileSystemStore`]: one directory per tenant with an index file
//!
//! Both keep the encoded document and its SHA-256 content hash, and both run
//! every read back through the snapshot codec so a stored document is
//! re-validated before it reaches the planner.
//!
//! # Example
//!
//! ```rust
//! use cartographer_core::{Snapshot, TenantId};
//! use cartographer_interface::SnapshotStore;
//! use cartographer_storage::InMemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryStore::new();
//! let snapshot = Snapshot::new(TenantId::from("t1"), chrono::Utc::now(), vec![], vec![], vec![])?;
//! let meta = store.put(&snapshot).await?;
//! let loaded = store.get(&TenantId::from("t1"), *meta.id()).await?;
//! assert_eq!(loaded, snapshot);
//! # Ok(())
//! # }
//! ```

mod filesystem;
mod memory;

pub use cartographer_error::{StorageError, StorageErrorKind};
pub use cartographer_interface::{SettingsStore, SnapshotMetadata, SnapshotStore};
pub use filesystem::FileSystemStore;
pub use memory::InMemoryStore;

use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of data as lowercase hex.
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
