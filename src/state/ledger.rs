//! Per-thread record of processed event ids.
//!
//! The platform returns the same newest item on consecutive polls, so every
//! event passes through [`DedupLedger::should_process`] before any side
//! effect. Only the last processed id per thread is persisted; the set of
//! recently seen ids lives in memory and is bounded.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};

use super::{load_document, write_document, StateError};

/// Recently seen ids kept per thread.
const SEEN_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct ThreadLedger {
    last: Option<String>,
    seen: VecDeque<String>,
}

impl ThreadLedger {
    fn mark(&mut self, event_id: &str) -> bool {
        if self.seen.iter().any(|s| s == event_id) {
            return false;
        }
        if self.seen.len() >= SEEN_CAPACITY {
            self.seen.pop_front();
        }
        self.seen.push_back(event_id.to_owned());
        self.last = Some(event_id.to_owned());
        true
    }
}

/// Deduplication ledger.
#[derive(Debug, Default)]
pub struct DedupLedger {
    path: Option<PathBuf>,
    threads: HashMap<String, ThreadLedger>,
    dirty: bool,
}

impl DedupLedger {
    /// A ledger that lives only for the process lifetime.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load a durable ledger from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing document cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        let lasts: BTreeMap<String, String> = load_document(path)?;
        let threads = lasts
            .into_iter()
            .map(|(thread_id, last)| {
                let mut ledger = ThreadLedger::default();
                ledger.mark(&last);
                (thread_id, ledger)
            })
            .collect();
        Ok(Self {
            path: Some(path.to_owned()),
            threads,
            dirty: false,
        })
    }

    /// Whether the pair has not been recorded yet. Does not record it.
    pub fn is_pending(&self, thread_id: &str, event_id: &str) -> bool {
        !event_id.is_empty()
            && self
                .threads
                .get(thread_id)
                .is_none_or(|t| !t.seen.iter().any(|s| s == event_id))
    }

    /// Returns `true` exactly once per `(thread_id, event_id)` pair and
    /// records the id. Empty ids cannot be deduplicated and are refused.
    pub fn should_process(&mut self, thread_id: &str, event_id: &str) -> bool {
        if event_id.is_empty() {
            return false;
        }
        let fresh = self
            .threads
            .entry(thread_id.to_owned())
            .or_default()
            .mark(event_id);
        self.dirty |= fresh;
        fresh
    }

    /// Most recently processed event id of a thread.
    pub fn last_processed(&self, thread_id: &str) -> Option<&str> {
        self.threads
            .get(thread_id)
            .and_then(|t| t.last.as_deref())
    }

    /// Write the last processed ids when the ledger is durable and changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written; the ledger stays
    /// dirty and the write is retried on the next call.
    pub fn persist(&mut self) -> Result<(), StateError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        let doc: BTreeMap<&str, &str> = self
            .threads
            .iter()
            .filter_map(|(thread, t)| t.last.as_deref().map(|last| (thread.as_str(), last)))
            .collect();
        write_document(path, &doc)?;
        self.dirty = false;
        Ok(())
    }
}
