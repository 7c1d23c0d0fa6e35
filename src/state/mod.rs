//! Durable bot state: privilege records, admin snapshots and the dedup ledger.
//!
//! Each store keeps one JSON document keyed by thread id and rewrites it
//! wholesale on every mutation through [`write_document`]. A mutation is
//! applied to a copy first and committed to memory only after the write
//! succeeded, so a failed write leaves both the file and the in-memory view
//! at their previous value.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod ledger;
pub mod privilege;
pub mod snapshot;

pub use ledger::DedupLedger;
pub use privilege::{PrivilegeRecord, PrivilegeStore};
pub use snapshot::SnapshotStore;

/// Errors from reading or writing a state document.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The document exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Document path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The document is not valid JSON for its schema.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// Document path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The document could not be encoded.
    #[error("failed to encode state document: {0}")]
    Encode(#[from] serde_json::Error),

    /// The document could not be written or moved into place.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// Document path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Load a document, returning the default value when the file is absent.
///
/// # Errors
///
/// Returns [`StateError::Read`] or [`StateError::Parse`] when an existing
/// file cannot be used.
pub fn load_document<T>(path: &Path) -> Result<T, StateError>
where
    T: DeserializeOwned + Default,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(source) => {
            return Err(StateError::Read {
                path: path.to_owned(),
                source,
            })
        }
    };
    if contents.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&contents).map_err(|source| StateError::Parse {
        path: path.to_owned(),
        source,
    })
}

/// Replace a document atomically: write a sibling temp file, then rename.
///
/// # Errors
///
/// Returns [`StateError::Encode`] or [`StateError::Write`]; the previous
/// document is untouched in either case.
pub fn write_document<T: Serialize>(path: &Path, doc: &T) -> Result<(), StateError> {
    let json = serde_json::to_string_pretty(doc)?;
    let write_err = |source| StateError::Write {
        path: path.to_owned(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json).map_err(write_err)?;
    std::fs::rename(&tmp_path, path).map_err(|source| {
        let _ = std::fs::remove_file(&tmp_path);
        StateError::Write {
            path: path.to_owned(),
            source,
        }
    })
}
