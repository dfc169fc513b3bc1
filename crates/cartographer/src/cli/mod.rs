//! Command-line interface module.
//!
//! This module provides the CLI structure and command handlers for the cartographer binary.

mod commands;
mod snapshot;
mod store;

pub use commands::{Cli, Commands};
pub use snapshot::{inspect_snapshot, plan_restore, simulate_restore};
pub use store::{list_snapshots, prune_snapshots};
