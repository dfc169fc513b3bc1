//! Platform adapter errors and retry classification.

use std::time::Duration;

/// Typed failures reported by a platform adapter.
///
/// The first three kinds are transient and retried with backoff; the rest are
/// permanent and recorded as operation failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum AdapterErrorKind {
    /// The request timed out or the connection dropped
    #[display("Request timed out: {}", _0)]
    Timeout(String),
    /// The platform answered with a 5xx-class status
    #[display("Server error {}: {}", status, message)]
    Server {
        /// HTTP-style status code
        status: u16,
        /// Platform message
        message: String,
    },
    /// The platform asked the caller to slow down
    #[display("Rate limited, retry after {:?}", retry_after)]
    RateLimited {
        /// Delay requested by the platform
        retry_after: Duration,
    },
    /// The credential lacks a permission the call needs
    #[display("Permission denied: {}", _0)]
    PermissionDenied(String),
    /// A platform quota (max roles, max channels) is exhausted
    #[display("Quota exceeded: {}", _0)]
    QuotaExceeded(String),
    /// The platform rejected the payload
    #[display("Malformed request: {}", _0)]
    Malformed(String),
    /// The target entity does not exist
    #[display("Not found: {}", _0)]
    NotFound(String),
}

impl AdapterErrorKind {
    /// Check if this error type should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterErrorKind::Timeout(_)
                | AdapterErrorKind::Server { .. }
                | AdapterErrorKind::RateLimited { .. }
        )
    }

    /// Delay the platform explicitly requested before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AdapterErrorKind::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Adapter error with source location tracking.
///
/// # Examples
///
/// ```
/// use cartographer_error::{AdapterError, AdapterErrorKind, RetryableError};
///
/// let err = AdapterError::new(AdapterErrorKind::Server {
///     status: 503,
///     message: "Service unavailable".to_string(),
/// });
/// assert!(err.is_retryable());
///
/// let denied = AdapterError::new(AdapterErrorKind::PermissionDenied("MANAGE_ROLES".into()));
/// assert!(!denied.is_retryable());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Adapter Error: {} at line {} in {}", kind, line, file)]
pub struct AdapterError {
    /// The kind of error that occurred
    pub kind: AdapterErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl AdapterError {
    /// Create a new adapter error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: AdapterErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}

/// Result type for platform adapter calls.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Trait for errors that support retry logic.
///
/// Transient errors like timeouts, 5xx responses or explicit rate limiting
/// return true from `is_retryable`. Permanent errors like permission denied or
/// malformed requests return false.
pub trait RetryableError {
    /// Returns true if this error should trigger a retry.
    fn is_retryable(&self) -> bool;

    /// Delay requested by the remote side before the next attempt, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl RetryableError for AdapterError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    fn retry_after(&self) -> Option<Duration> {
        self.kind.retry_after()
    }
}
