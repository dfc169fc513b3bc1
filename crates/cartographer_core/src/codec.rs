//! Snapshot serialization.
//!
//! Documents are JSON. Unknown fields are ignored so newer writers that only
//! add optional data stay readable.

use crate::{SCHEMA_VERSION, Snapshot};
use cartographer_error::{FormatError, FormatErrorKind};
use serde::Deserialize;

#[derive(Deserialize)]
struct Header {
    schema_version: u32,
}

/// Encode a snapshot as compact JSON.
///
/// # Errors
///
/// Returns [`FormatErrorKind::Parse`] if encoding fails.
pub fn serialize(snapshot: &Snapshot) -> Result<Vec<u8>, FormatError> {
    serde_json::to_vec(snapshot).map_err(|e| FormatError::new(FormatErrorKind::Parse(e.to_string())))
}

/// Encode a snapshot as indented JSON.
///
/// # Errors
///
/// Returns [`FormatErrorKind::Parse`] if encoding fails.
pub fn serialize_pretty(snapshot: &Snapshot) -> Result<Vec<u8>, FormatError> {
    serde_json::to_vec_pretty(snapshot)
        .map_err(|e| FormatError::new(FormatErrorKind::Parse(e.to_string())))
}

/// Decode and validate a snapshot document.
///
/// The schema version is checked before the body is parsed, so a document
/// from a newer build is reported as [`FormatErrorKind::UnsupportedVersion`]
/// rather than as a parse failure.
///
/// # Errors
///
/// Returns a [`FormatError`] when the bytes are malformed, the version is
/// unsupported, or a referential invariant does not hold.
#[tracing::instrument(skip(bytes), fields(len = bytes.len()))]
pub fn deserialize(bytes: &[u8]) -> Result<Snapshot, FormatError> {
    let header: Header = serde_json::from_slice(bytes)
        .map_err(|e| FormatError::new(FormatErrorKind::Parse(e.to_string())))?;

    if header.schema_version == 0 || header.schema_version > SCHEMA_VERSION {
        tracing::warn!(found = header.schema_version, "Rejecting snapshot with unsupported schema version");
        return Err(FormatError::new(FormatErrorKind::UnsupportedVersion {
            found: header.schema_version,
            supported: SCHEMA_VERSION,
        }));
    }

    let snapshot: Snapshot = serde_json::from_slice(bytes)
        .map_err(|e| FormatError::new(FormatErrorKind::Parse(e.to_string())))?;
    snapshot.validate()?;

    tracing::debug!(tenant = %snapshot.tenant_id(), "Snapshot decoded");
    Ok(snapshot)
}
