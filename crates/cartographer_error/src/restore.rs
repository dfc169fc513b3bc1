//! Errors that reject a backup or restore request before any work starts.

/// Request-level rejection reasons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum RestoreErrorKind {
    /// A tenant guard was presented for the wrong tenant
    #[display("Lock held for tenant '{}' cannot be used for tenant '{}'", held, requested)]
    TenantMismatch {
        /// Tenant the guard belongs to
        held: String,
        /// Tenant the call targeted
        requested: String,
    },
    /// The tenant has backups switched off in its settings
    #[display("Backups are disabled for tenant '{}'", _0)]
    BackupsDisabled(String),
    /// The requested snapshot does not exist for the tenant
    #[display("Snapshot '{}' not found for tenant '{}'", snapshot, tenant)]
    SnapshotNotFound {
        /// Tenant id
        tenant: String,
        /// Snapshot id
        snapshot: String,
    },
}

/// Request rejection with source location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Restore Error: {} at line {} in {}", kind, line, file)]
pub struct RestoreError {
    /// The kind of error that occurred
    pub kind: RestoreErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl RestoreError {
    /// Create a new restore error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: RestoreErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
