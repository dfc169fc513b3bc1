//! Top-level error wrapper types.

use crate::{AdapterError, CaptureError, ConfigError, FormatError, RestoreError, StorageError};

/// Every error that can abort a Cartographer call.
///
/// # Examples
///
/// ```
/// use cartographer_error::{CartographerError, ConfigError};
///
/// let err: CartographerError = ConfigError::new("missing tier").into();
/// assert!(format!("{}", err).contains("Configuration Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum CartographerErrorKind {
    /// Malformed or referentially invalid snapshot
    #[from(FormatError)]
    Format(FormatError),
    /// Live hierarchy could not be read during capture
    #[from(CaptureError)]
    Capture(CaptureError),
    /// Platform adapter call failed
    #[from(AdapterError)]
    Adapter(AdapterError),
    /// Snapshot or settings persistence failed
    #[from(StorageError)]
    Storage(StorageError),
    /// Configuration could not be loaded
    #[from(ConfigError)]
    Config(ConfigError),
    /// Restore or backup request was rejected before any work started
    #[from(RestoreError)]
    Restore(RestoreError),
}

/// Cartographer error with kind discrimination.
///
/// # Examples
///
/// ```
/// use cartographer_error::{CartographerError, CartographerErrorKind, StorageError, StorageErrorKind};
///
/// let err = CartographerError::from(StorageError::new(StorageErrorKind::NotFound(
///     "guild-1/abc".to_string(),
/// )));
/// assert!(matches!(err.kind(), CartographerErrorKind::Storage(_)));
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Cartographer Error: {}", _0)]
pub struct CartographerError(Box<CartographerErrorKind>);

impl CartographerError {
    /// Create a new error from a kind.
    pub fn new(kind: CartographerErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &CartographerErrorKind {
        &self.0
    }
}

impl<T> From<T> for CartographerError
where
    T: Into<CartographerErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Cartographer operations.
pub type CartographerResult<T> = std::result::Result<T, CartographerError>;
