//! Persisted state document.
//!
//! DESIGN
//! ======
//! The whole tree is written as one JSON document under a single storage
//! key, wrapped in the envelope the mobile app's persist middleware used:
//! `{"state": {...}, "version": N}`. Version 0 is the unversioned legacy
//! layout and decodes with the same shape as version 1.

use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Storage slot used by the app unless configured otherwise.
pub const DEFAULT_STORAGE_KEY: &str = "fetchit-storage";

/// Schema version written by this build.
pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("malformed state document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported document version {found} (this build reads up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    state: &'a AppState,
    version: u32,
}

#[derive(Deserialize)]
struct Envelope {
    state: AppState,
}

#[derive(Deserialize)]
struct VersionHeader {
    #[serde(default)]
    version: u32,
}

/// Serialize the tree into a document at [`CURRENT_VERSION`].
///
/// # Errors
///
/// Returns `Malformed` if serialization fails (non-string map keys and the like;
/// not reachable with the current model).
pub fn encode(state: &AppState) -> Result<String, DocumentError> {
    Ok(serde_json::to_string(&EnvelopeRef { state, version: CURRENT_VERSION })?)
}

/// Parse a stored document back into a tree. Timestamps come back as real
/// `DateTime<Utc>` values.
///
/// # Errors
///
/// Returns `UnsupportedVersion` for documents newer than this build, and
/// `Malformed` for anything that is not a valid envelope.
pub fn decode(raw: &str) -> Result<AppState, DocumentError> {
    let header: VersionHeader = serde_json::from_str(raw)?;
    if header.version > CURRENT_VERSION {
        return Err(DocumentError::UnsupportedVersion { found: header.version, supported: CURRENT_VERSION });
    }
    let envelope: Envelope = serde_json::from_str(raw)?;
    Ok(envelope.state)
}

#[cfg(test)]
#[path = "document_test.rs"]
mod tests;
