//! Snapshot format errors.
//!
//! A `FormatError` is fatal: a snapshot that fails to parse or violates a
//! referential invariant is never repaired automatically.

/// Reasons a snapshot document is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum FormatErrorKind {
    /// The document declares a schema version this build cannot read
    #[display("Unsupported schema version {} (this build reads up to {})", found, supported)]
    UnsupportedVersion {
        /// Version found in the document
        found: u32,
        /// Highest version this build understands
        supported: u32,
    },
    /// The bytes are not a well-formed snapshot document
    #[display("Malformed snapshot document: {}", _0)]
    Parse(String),
    /// Two entities of the same kind share a snapshot key
    #[display("Duplicate {} key '{}'", entity, key)]
    DuplicateKey {
        /// Entity kind ("role", "group", "channel")
        entity: String,
        /// The repeated key
        key: String,
    },
    /// A channel references a group that is not in the snapshot
    #[display("Channel '{}' references unknown parent group '{}'", channel, parent)]
    DanglingParent {
        /// Channel key
        channel: String,
        /// Missing group key
        parent: String,
    },
    /// An overlay references a role that is not in the snapshot
    #[display("Overlay on '{}' references unknown role '{}'", entity, role)]
    DanglingSubject {
        /// Key of the group or channel carrying the overlay
        entity: String,
        /// Missing role key
        role: String,
    },
    /// An overlay both allows and denies the same permission bits
    #[display("Overlay on '{}' allows and denies the same bits ({:#x})", entity, bits)]
    OverlappingOverlay {
        /// Key of the group or channel carrying the overlay
        entity: String,
        /// The overlapping bits
        bits: u64,
    },
    /// An entity carries a type tag that is not valid for its position in the tree
    #[display("Entity '{}' has invalid kind '{}'", entity, kind)]
    InvalidKind {
        /// Entity key
        entity: String,
        /// Offending kind
        kind: String,
    },
    /// The snapshot belongs to a different tenant than requested
    #[display("Snapshot belongs to tenant '{}', expected '{}'", found, expected)]
    TenantMismatch {
        /// Tenant the caller asked for
        expected: String,
        /// Tenant recorded in the snapshot
        found: String,
    },
}

/// Snapshot format error with source location tracking.
///
/// # Examples
///
/// ```
/// use cartographer_error::{FormatError, FormatErrorKind};
///
/// let err = FormatError::new(FormatErrorKind::DanglingParent {
///     channel: "c1".to_string(),
///     parent: "g9".to_string(),
/// });
/// assert!(err.to_string().contains("unknown parent group 'g9'"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Format Error: {} at line {} in {}", kind, line, file)]
pub struct FormatError {
    /// The kind of error that occurred
    pub kind: FormatErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl FormatError {
    /// Create a new format error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: FormatErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
