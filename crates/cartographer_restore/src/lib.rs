//! Capture, identity resolution, restore planning and execution.
//!
//! The restore pipeline runs in four steps:
//!
//! 1. [`read_live_state`] reads the tenant's current hierarchy.
//! 2. [`resolve`] matches snapshot nodes to live entities (pure).
//! 3. [`plan`] turns the snapshot and the resolution into an ordered
//!    [`RestorePlan`] (pure).
//! 4. [`Executor::execute`] applies the plan barrier by barrier and returns a
//!    [`RestoreReport`] with one outcome per planned operation.
//!
//! [`Cartographer`] wires the steps to an adapter, a snapshot store and the
//! per-tenant locks, and adds backup with retention.
//!
//! # Example
//!
//! ```
//! use cartographer_core::{LiveRole, LiveState, Permissions, TenantId};
//! use cartographer_rate_limit::CartographerConfig;
//! use cartographer_restore::{CancelToken, Cartographer, MemoryPlatform, RestorePolicy};
//! use cartographer_storage::InMemoryStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let tenant = TenantId::from("guild-1");
//! let everyone = LiveRole {
//!     id: "1".into(),
//!     name: "@everyone".into(),
//!     color: 0,
//!     hoist: false,
//!     mentionable: false,
//!     permissions: Permissions::VIEW_CHANNEL,
//!     position: 0,
//!     managed: false,
//!     is_default: true,
//! };
//! let platform = Arc::new(MemoryPlatform::new().with_state(
//!     tenant.clone(),
//!     LiveState { roles: vec![everyone], ..Default::default() },
//! ));
//! let store = Arc::new(InMemoryStore::new());
//! let service = Cartographer::new(platform, store.clone(), store, CartographerConfig::default());
//!
//! let backup = service.backup(&tenant).await?;
//! let outcome = service
//!     .restore(&tenant, *backup.snapshot().id(), RestorePolicy::default(), &CancelToken::new())
//!     .await?;
//! assert!(outcome.report().is_complete());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod capture;
mod executor;
mod live;
mod lock;
mod memory;
mod planner;
mod report;
mod resolver;
mod retention;
mod service;

pub use capture::capture;
pub use executor::{CancelToken, Executor};
pub use live::{read_live_state, without_ignored};
pub use lock::{TenantGuard, TenantLocks};
pub use memory::{CallKind, FailureRule, MemoryPlatform, RecordedCall};
pub use planner::{
    Barrier, Bindings, NodeRef, Operation, OrderingViolation, PlanDiagnostic,
    RESERVED_ROLE_NAMES, RestorePlan, RestorePolicy, SubjectRef, is_reserved_role_name, plan,
};
pub use report::{FailureReason, OperationOutcome, OperationReport, RestoreReport, SkipReason};
pub use resolver::{Resolution, ResolutionAmbiguity, ResolutionMap, resolve};
pub use retention::enforce_retention;
pub use service::{BackupOutcome, Cartographer, RestoreOutcome};
