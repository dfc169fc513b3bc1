//! Cartographer - structural backup and restore for community platforms
//!
//! Cartographer captures a tenant's role, group and channel hierarchy with its
//! permission overlays into a portable snapshot, and restores a snapshot onto
//! the tenant's current live state with an ordered, idempotent plan.
//!
//! # Features
//!
//! - **Snapshots**: Versioned, self-validating JSON documents keyed by snapshot-local keys
//! - **Identity Resolution**: Name-and-kind matching with deterministic tie-breaks
//! - **Restore Planning**: Barrier-ordered operations that only touch what differs
//! - **Execution**: Rate-limited, retrying, cancellable, with per-operation outcomes
//! - **Retention**: Per-tenant snapshot quotas under a tenant lock
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use cartographer::{CancelToken, Cartographer, CartographerConfig, FileSystemStore, RestorePolicy};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(FileSystemStore::new("./backups")?);
//!     let service = Cartographer::new(my_adapter(), store.clone(), store, CartographerConfig::load()?);
//!
//!     let tenant = "guild-1".into();
//!     let backup = service.backup(&tenant).await?;
//!     let outcome = service
//!         .restore(&tenant, *backup.snapshot().id(), RestorePolicy::default(), &CancelToken::new())
//!         .await?;
//!     println!("{}", outcome.report());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! Cartographer is organized as a workspace with focused crates:
//!
//! - `cartographer_error` - Error types
//! - `cartographer_core` - Snapshot model, live-state types, codec
//! - `cartographer_rate_limit` - Rate limiting, retry and configuration
//! - `cartographer_interface` - Platform adapter and store traits
//! - `cartographer_storage` - In-memory and filesystem stores
//! - `cartographer_restore` - Capture, resolve, plan, execute, retention
//!
//! This crate (`cartographer`) re-exports everything for convenience and
//! hosts the `cartographer` binary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use cartographer_core::*;
pub use cartographer_error::*;
pub use cartographer_interface::*;
pub use cartographer_rate_limit::*;
pub use cartographer_restore::*;
pub use cartographer_storage::{FileSystemStore, InMemoryStore, compute_hash};

pub mod offline;
pub mod telemetry;
