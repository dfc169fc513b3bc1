//! Capture error types.

/// Reasons a capture is abandoned.
///
/// A capture is atomic: any of these means nothing was persisted and the
/// caller may retry the whole capture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum CaptureErrorKind {
    /// Transient failure while reading the live hierarchy
    #[display("Failed to read live {}: {}", what, message)]
    Read {
        /// What was being read ("roles", "channels", ...)
        what: String,
        /// Adapter message
        message: String,
    },
    /// The platform refused the read (missing permission, unknown tenant)
    #[display("Platform rejected read of {}: {}", what, message)]
    Rejected {
        /// What was being read
        what: String,
        /// Adapter message
        message: String,
    },
    /// The captured hierarchy does not form a valid snapshot
    #[display("Captured hierarchy is invalid: {}", _0)]
    Invalid(String),
}

/// Capture error with source location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Capture Error: {} at line {} in {}", kind, line, file)]
pub struct CaptureError {
    /// The kind of error that occurred
    pub kind: CaptureErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl CaptureError {
    /// Create a new capture error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: CaptureErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Whether retrying the whole capture may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, CaptureErrorKind::Read { .. })
    }
}
