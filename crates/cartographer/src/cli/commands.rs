//! CLI command definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Cartographer - structural backup and restore of role and channel hierarchies
#[derive(Parser, Debug)]
#[command(name = "cartographer")]
#[command(about = "Structural backup and restore of role and channel hierarchies", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "CARTOGRAPHER_JSON_LOGS")]
    pub json_logs: bool,

    /// Configuration file (defaults to the bundled, user and local cartographer.toml)
    #[arg(long, global = true, env = "CARTOGRAPHER_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a backup file and summarize its contents
    Inspect {
        /// Path to the snapshot file
        snapshot: PathBuf,

        /// Output format
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },

    /// Print the restore plan for a snapshot over a live-state dump
    Plan {
        /// Path to the snapshot file
        snapshot: PathBuf,

        /// Path to the live state (JSON)
        #[arg(long)]
        live: PathBuf,

        /// Also delete live entities the snapshot does not contain
        #[arg(long)]
        delete_existing: bool,

        /// Output format
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },

    /// Execute the restore against an in-memory copy of a live-state dump
    Simulate {
        /// Path to the snapshot file
        snapshot: PathBuf,

        /// Path to the live state (JSON)
        #[arg(long)]
        live: PathBuf,

        /// Also delete live entities the snapshot does not contain
        #[arg(long)]
        delete_existing: bool,

        /// Write the resulting live state (JSON) here
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// List the snapshots of a tenant in a filesystem store
    List {
        /// Store directory
        #[arg(long, env = "CARTOGRAPHER_STORE")]
        store: PathBuf,

        /// Tenant id
        #[arg(long)]
        tenant: String,

        /// Output format
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },

    /// Evict the oldest snapshots of a tenant beyond a quota
    Prune {
        /// Store directory
        #[arg(long, env = "CARTOGRAPHER_STORE")]
        store: PathBuf,

        /// Tenant id
        #[arg(long)]
        tenant: String,

        /// Snapshots to keep
        #[arg(long)]
        max: usize,
    },
}

/// Output format options
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}
