//! Trait definitions for the Cartographer restore engine.
//!
//! This crate defines the seams between the engine and the outside world:
//! - [`PlatformAdapter`]: reads and mutates a live hierarchy
//! - [`SnapshotStore`]: persists snapshot records
//! - [`SettingsStore`]: persists per-tenant settings

mod drafts;
mod platform;
mod store;

pub use drafts::{ChannelDraft, RoleDraft};
pub use platform::{AdapterLimits, PlatformAdapter};
pub use store::{SettingsStore, SnapshotMetadata, SnapshotStore};
