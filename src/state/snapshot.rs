//! Last observed native-admin list per thread.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{load_document, write_document, StateError};

/// Persisted admin snapshots, keyed by thread id.
///
/// A thread with no entry is in the unknown state; an entry holding an
/// empty list is a tracked thread with no admins.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    path: Option<PathBuf>,
    snapshots: BTreeMap<String, Vec<String>>,
}

impl SnapshotStore {
    /// Open the store backed by `path`, loading existing snapshots.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing document cannot be read or parsed.
    pub fn open(path: &Path) -> Result<Self, StateError> {
        Ok(Self {
            path: Some(path.to_owned()),
            snapshots: load_document(path)?,
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Snapshot of a thread, or `None` when the thread is not yet tracked.
    pub fn get(&self, thread_id: &str) -> Option<&[String]> {
        self.snapshots.get(thread_id).map(Vec::as_slice)
    }

    /// All snapshots, keyed by thread id.
    pub fn all(&self) -> &BTreeMap<String, Vec<String>> {
        &self.snapshots
    }

    /// Replace the snapshot of a thread. Duplicates are dropped, first
    /// occurrence wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written; the previous
    /// snapshot is kept.
    pub fn set(&mut self, thread_id: &str, admins: &[String]) -> Result<(), StateError> {
        let mut deduped: Vec<String> = Vec::with_capacity(admins.len());
        for id in admins {
            if !deduped.contains(id) {
                deduped.push(id.clone());
            }
        }
        if self.get(thread_id) == Some(deduped.as_slice()) {
            return Ok(());
        }

        let mut next = self.snapshots.clone();
        next.insert(thread_id.to_owned(), deduped);
        if let Some(path) = &self.path {
            write_document(path, &next)?;
        }
        self.snapshots = next;
        Ok(())
    }
}
