//! Wire types for the direct-messaging API.
//!
//! The API reports the same logical field under several keys depending on
//! the endpoint (`pk`, `id`, `user_id`) and encodes ids as either numbers or
//! strings. Those variations are absorbed here, once, and everything past
//! this module uses [`ThreadSummary`] and [`ThreadState`].

use serde::Deserialize;
use serde_json::Value;

use super::{PlatformError, ThreadState, ThreadSummary};
use crate::types::Identity;

/// Roles that the API uses to mark a native admin.
const ADMIN_ROLES: &[&str] = &["admin", "creator", "administrator"];

/// An id that may arrive as a JSON number or string.
#[doc(hidden)]
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    /// Numeric id.
    Num(u64),
    /// String id.
    Text(String),
}

impl WireId {
    /// Numeric value, when the id is a number or a numeric string.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Num(n) => i64::try_from(*n).ok(),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Canonical string form.
    pub fn into_string(self) -> String {
        match self {
            Self::Num(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

/// A thread participant.
#[doc(hidden)]
#[derive(Debug, Clone, Deserialize)]
pub struct WireUser {
    /// User id, as sent by the thread endpoints.
    #[serde(default)]
    pub pk: Option<WireId>,
    /// User id, as sent by some action payloads.
    #[serde(default)]
    pub id: Option<WireId>,
    /// User id, as sent by older payloads.
    #[serde(default)]
    pub user_id: Option<WireId>,
    /// Handle.
    #[serde(default)]
    pub username: Option<String>,
    /// Native admin flag.
    #[serde(default)]
    pub is_admin: bool,
    /// Moderator flag, treated as admin.
    #[serde(default)]
    pub is_moderator: bool,
    /// Team admin flag, treated as admin.
    #[serde(default)]
    pub is_team_admin: bool,
    /// Free-form role string.
    #[serde(default, alias = "status")]
    pub role: Option<String>,
}

impl WireUser {
    fn is_native_admin(&self) -> bool {
        self.is_admin
            || self.is_moderator
            || self.is_team_admin
            || self
                .role
                .as_deref()
                .is_some_and(|r| ADMIN_ROLES.iter().any(|a| r.eq_ignore_ascii_case(a)))
    }

    /// First non-empty id among `pk`, `id` and `user_id`.
    fn first_id(&self) -> Option<String> {
        [&self.pk, &self.id, &self.user_id]
            .into_iter()
            .flatten()
            .map(|id| id.clone().into_string())
            .find(|id| !id.is_empty())
    }

    /// `None` when the object carries no usable id.
    pub(crate) fn into_identity(self) -> Option<Identity> {
        let id = self.first_id()?;
        Some(match self.username {
            Some(handle) => Identity::with_handle(id, handle),
            None => Identity::new(id),
        })
    }
}

/// A thread as returned by the inbox and thread endpoints.
#[doc(hidden)]
#[derive(Debug, Clone, Deserialize)]
pub struct WireThread {
    /// Thread id.
    pub thread_id: WireId,
    /// Title.
    #[serde(default)]
    pub thread_title: Option<String>,
    /// Participants other than the viewer.
    #[serde(default)]
    pub users: Vec<WireUser>,
    /// Explicit group flag, when present.
    #[serde(default)]
    pub is_group: Option<bool>,
    /// Ids of native admins, including the viewer.
    #[serde(default)]
    pub admin_user_ids: Vec<WireId>,
    /// Items, newest first.
    #[serde(default)]
    pub items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct InboxEnvelope {
    #[serde(default)]
    inbox: InboxBody,
}

#[derive(Debug, Default, Deserialize)]
struct InboxBody {
    #[serde(default)]
    threads: Vec<WireThread>,
}

#[derive(Debug, Deserialize)]
struct ThreadEnvelope {
    thread: WireThread,
}

/// Parse the inbox endpoint body.
///
/// Threads without an explicit group flag count as groups when they list at
/// least `group_min_users` other participants.
///
/// # Errors
///
/// Returns [`PlatformError::Parse`] when the body is not a valid inbox.
pub fn parse_inbox(body: &str, group_min_users: usize) -> Result<Vec<ThreadSummary>, PlatformError> {
    let envelope: InboxEnvelope =
        serde_json::from_str(body).map_err(|e| PlatformError::Parse(e.to_string()))?;

    Ok(envelope
        .inbox
        .threads
        .into_iter()
        .map(|t| {
            let is_group = t.is_group.unwrap_or(t.users.len() >= group_min_users);
            ThreadSummary {
                thread_id: t.thread_id.into_string(),
                title: t.thread_title,
                users: t.users.into_iter().filter_map(WireUser::into_identity).collect(),
                is_group,
            }
        })
        .collect())
}

/// Parse the thread endpoint body into live state and raw items.
///
/// # Errors
///
/// Returns [`PlatformError::Parse`] when the body is not a valid thread.
pub fn parse_thread(body: &str) -> Result<(ThreadState, Vec<Value>), PlatformError> {
    let envelope: ThreadEnvelope =
        serde_json::from_str(body).map_err(|e| PlatformError::Parse(e.to_string()))?;
    let thread = envelope.thread;

    let mut admins: Vec<String> = Vec::new();
    let mut push_admin = |id: String| {
        if !id.is_empty() && !admins.contains(&id) {
            admins.push(id);
        }
    };
    for id in thread.admin_user_ids {
        push_admin(id.into_string());
    }

    let mut members = Vec::with_capacity(thread.users.len());
    for user in thread.users {
        let admin = user.is_native_admin();
        let Some(member) = user.into_identity() else {
            continue;
        };
        if admin {
            push_admin(member.id.clone());
        }
        members.push(member);
    }

    Ok((ThreadState { members, admins }, thread.items))
}
