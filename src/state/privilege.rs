//! Per-thread privilege records: activation, owner, co-owners, bot-admins.
//!
//! These are grants made through the bot's own commands and are independent
//! of who the platform currently flags as admin.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{load_document, write_document, StateError};
use crate::platform::ThreadState;
use crate::types::Identity;

/// Bot-internal grants for one thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivilegeRecord {
    /// Whether the bot acts in this thread.
    pub activated: bool,
    /// Recognised group owner.
    pub owner: Option<Identity>,
    /// Ids granted bot-admin.
    pub bot_admins: BTreeSet<String>,
    /// Ids recognised as co-owners.
    pub secondary_owners: BTreeSet<String>,
    /// Developer id that last activated the thread.
    pub activated_by: Option<String>,
}

/// Store of [`PrivilegeRecord`]s plus the configured developer ids.
#[derive(Debug)]
pub struct PrivilegeStore {
    path: Option<PathBuf>,
    developers: BTreeSet<String>,
    records: BTreeMap<String, PrivilegeRecord>,
}

impl PrivilegeStore {
    /// Open the store backed by `path`, loading existing records.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing document cannot be read or parsed.
    pub fn open(
        path: &Path,
        developers: impl IntoIterator<Item = String>,
    ) -> Result<Self, StateError> {
        let records = load_document(path)?;
        Ok(Self {
            path: Some(path.to_owned()),
            developers: developers.into_iter().collect(),
            records,
        })
    }

    /// A store that never touches disk.
    pub fn in_memory(developers: impl IntoIterator<Item = String>) -> Self {
        Self {
            path: None,
            developers: developers.into_iter().collect(),
            records: BTreeMap::new(),
        }
    }

    // -- queries -------------------------------------------------------

    /// Whether `user_id` is a configured developer.
    pub fn is_developer(&self, user_id: &str) -> bool {
        self.developers.contains(user_id)
    }

    /// Record for a thread, if the bot has one.
    pub fn record(&self, thread_id: &str) -> Option<&PrivilegeRecord> {
        self.records.get(thread_id)
    }

    /// All records, keyed by thread id.
    pub fn records(&self) -> &BTreeMap<String, PrivilegeRecord> {
        &self.records
    }

    /// Whether the bot is active in a thread.
    pub fn is_activated(&self, thread_id: &str) -> bool {
        self.record(thread_id).is_some_and(|r| r.activated)
    }

    /// Recognised owner of a thread.
    pub fn owner(&self, thread_id: &str) -> Option<&Identity> {
        self.record(thread_id).and_then(|r| r.owner.as_ref())
    }

    /// Whether `user_id` is the recognised owner.
    pub fn is_owner(&self, thread_id: &str, user_id: &str) -> bool {
        self.owner(thread_id).is_some_and(|o| o.is(user_id))
    }

    /// Whether `user_id` holds a bot-admin grant.
    pub fn is_bot_admin(&self, thread_id: &str, user_id: &str) -> bool {
        self.record(thread_id)
            .is_some_and(|r| r.bot_admins.contains(user_id))
    }

    /// Whether `user_id` is a recognised co-owner.
    pub fn is_secondary_owner(&self, thread_id: &str, user_id: &str) -> bool {
        self.record(thread_id)
            .is_some_and(|r| r.secondary_owners.contains(user_id))
    }

    /// Whether `user_id` may run protected moderation commands.
    ///
    /// Any of owner, bot-admin, live native admin or developer suffices.
    pub fn is_authorized(&self, thread_id: &str, user_id: &str, live: &ThreadState) -> bool {
        self.is_owner(thread_id, user_id)
            || self.is_bot_admin(thread_id, user_id)
            || live.is_admin(user_id)
            || self.is_developer(user_id)
    }

    // -- mutators ------------------------------------------------------
    //
    // Each returns `Ok(true)` when the record changed, `Ok(false)` when it
    // already had the requested value.

    /// Activate the bot in a thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn activate(&mut self, thread_id: &str, by: &str) -> Result<bool, StateError> {
        self.mutate(thread_id, |r| {
            if r.activated {
                return false;
            }
            r.activated = true;
            r.activated_by = Some(by.to_owned());
            true
        })
    }

    /// Deactivate the bot in a thread, keeping the rest of the record.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn deactivate(&mut self, thread_id: &str) -> Result<bool, StateError> {
        self.mutate(thread_id, |r| std::mem::replace(&mut r.activated, false))
    }

    /// Recognise `owner` as the group owner, replacing any previous owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn set_owner(&mut self, thread_id: &str, owner: Identity) -> Result<bool, StateError> {
        self.mutate(thread_id, |r| {
            if r.owner.as_ref().is_some_and(|o| o == &owner && o.handle == owner.handle) {
                return false;
            }
            r.secondary_owners.remove(&owner.id);
            r.owner = Some(owner);
            true
        })
    }

    /// Grant bot-admin to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn grant_bot_admin(&mut self, thread_id: &str, user_id: &str) -> Result<bool, StateError> {
        self.mutate(thread_id, |r| r.bot_admins.insert(user_id.to_owned()))
    }

    /// Revoke bot-admin from `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn revoke_bot_admin(&mut self, thread_id: &str, user_id: &str) -> Result<bool, StateError> {
        if !self.is_bot_admin(thread_id, user_id) {
            return Ok(false);
        }
        self.mutate(thread_id, |r| r.bot_admins.remove(user_id))
    }

    /// Recognise `user_id` as a co-owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn add_secondary_owner(
        &mut self,
        thread_id: &str,
        user_id: &str,
    ) -> Result<bool, StateError> {
        if self.is_owner(thread_id, user_id) {
            return Ok(false);
        }
        self.mutate(thread_id, |r| r.secondary_owners.insert(user_id.to_owned()))
    }

    /// Withdraw co-owner recognition from `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn remove_secondary_owner(
        &mut self,
        thread_id: &str,
        user_id: &str,
    ) -> Result<bool, StateError> {
        if !self.is_secondary_owner(thread_id, user_id) {
            return Ok(false);
        }
        self.mutate(thread_id, |r| r.secondary_owners.remove(user_id))
    }

    fn mutate(
        &mut self,
        thread_id: &str,
        apply: impl FnOnce(&mut PrivilegeRecord) -> bool,
    ) -> Result<bool, StateError> {
        let mut next = self.records.clone();
        let record = next.entry(thread_id.to_owned()).or_default();
        if !apply(record) {
            return Ok(false);
        }
        if let Some(path) = &self.path {
            write_document(path, &next)?;
        }
        self.records = next;
        info!(thread_id, "privilege record updated");
        Ok(true)
    }
}
