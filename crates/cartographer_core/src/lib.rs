//! Core data types for the Cartographer backup and restore engine.
//!
//! This crate holds the snapshot model (what a backup contains), the live-state
//! types (what a platform adapter reports), permission sets and per-tenant
//! settings. It performs no I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod ids;
mod kind;
mod live;
mod permissions;
mod settings;
mod snapshot;

pub use codec::{deserialize, serialize, serialize_pretty};
pub use ids::{EntityId, SnapshotId, TenantId};
pub use kind::{ChannelKind, EntityKind};
pub use live::{LiveEntity, LiveOverlay, LiveRole, LiveState, LiveSubject};
pub use permissions::Permissions;
pub use settings::TenantSettings;
pub use snapshot::{
    ChannelSpec, ChannelSpecBuilder, GroupSpec, GroupSpecBuilder, OverlaySubject,
    PermissionOverlay, RoleSpec, RoleSpecBuilder, SCHEMA_VERSION, Snapshot, SnapshotSummary,
};
