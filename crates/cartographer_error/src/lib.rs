//! Error types for the Cartographer backup and restore engine.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All constructors use `#[track_caller]` for automatic location capture
//!
//! Only snapshot-level failures (format, capture, storage) travel through
//! [`CartographerResult`]. Per-operation failures during a restore are recorded
//! in the restore report instead of being raised.
//!
//! # Examples
//!
//! ```
//! use cartographer_error::{CartographerResult, FormatError, FormatErrorKind};
//!
//! fn load() -> CartographerResult<()> {
//!     Err(FormatError::new(FormatErrorKind::UnsupportedVersion {
//!         found: 9,
//!         supported: 1,
//!     }))?
//! }
//!
//! assert!(load().unwrap_err().to_string().contains("schema version 9"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod capture;
mod config;
mod error;
mod format;
mod restore;
mod storage;

pub use adapter::{AdapterError, AdapterErrorKind, AdapterResult, RetryableError};
pub use capture::{CaptureError, CaptureErrorKind};
pub use config::ConfigError;
pub use error::{CartographerError, CartographerErrorKind, CartographerResult};
pub use format::{FormatError, FormatErrorKind};
pub use restore::{RestoreError, RestoreErrorKind};
pub use storage::{StorageError, StorageErrorKind};
