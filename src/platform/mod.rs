//! Messaging platform boundary: the transport trait, its errors, and the
//! strict view of thread state the rest of the crate works with.
//!
//! [`client::HttpPlatform`] talks to the private direct-messaging API over
//! HTTP. Everything above this module sees only [`Platform`], so the engine
//! can be driven by an in-memory fake in tests.

use async_trait::async_trait;

use crate::types::Identity;

pub mod client;
pub mod wire;

/// Errors from the platform transport.
///
/// Ordinary HTTP failures of mutating calls are reported as `Ok(false)`;
/// these variants cover failures the caller cannot treat as a plain "no".
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The HTTP client could not be built or a request could not be sent.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// All retry attempts were used up on transient failures.
    #[error("{endpoint} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Endpoint path that was requested.
        endpoint: String,
        /// Number of attempts made.
        attempts: u32,
        /// Description of the last failure.
        last: String,
    },

    /// A read endpoint answered with a non-success status.
    #[error("platform returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// Response body did not match the expected schema.
    #[error("platform response parse error: {0}")]
    Parse(String),

    /// The client could not be configured (bad header value, bad URL).
    #[error("invalid platform client configuration: {0}")]
    Config(String),
}

/// One conversation as listed in the inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSummary {
    /// Opaque thread id.
    pub thread_id: String,
    /// Thread title, if the platform reports one.
    pub title: Option<String>,
    /// Other participants (the viewing account is not listed).
    pub users: Vec<Identity>,
    /// Whether this is a group conversation.
    pub is_group: bool,
}

/// Live membership and native-admin state of a thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadState {
    /// Current members.
    pub members: Vec<Identity>,
    /// Ids of native admins, in platform order, without duplicates.
    pub admins: Vec<String>,
}

impl ThreadState {
    /// Whether `user_id` is currently a native admin.
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admins.iter().any(|a| a == user_id)
    }

    /// Whether `user_id` is currently a member.
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m.is(user_id))
    }

    /// Find a member by handle, ignoring case and a leading `@`.
    pub fn member_by_handle(&self, handle: &str) -> Option<&Identity> {
        let wanted = handle.trim_start_matches('@');
        self.members.iter().find(|m| {
            m.handle
                .as_deref()
                .is_some_and(|h| h.eq_ignore_ascii_case(wanted))
        })
    }

    /// Find a member by id.
    pub fn member(&self, user_id: &str) -> Option<&Identity> {
        self.members.iter().find(|m| m.is(user_id))
    }

    /// Resolve an id to the richest identity known, falling back to a bare id.
    pub fn identity(&self, user_id: &str) -> Identity {
        self.member(user_id)
            .cloned()
            .unwrap_or_else(|| Identity::new(user_id))
    }
}

/// Authenticated access to the messaging platform.
///
/// Mutating calls return `Ok(true)` when the platform accepted the request,
/// `Ok(false)` on an ordinary HTTP refusal, and `Err` only when the transport
/// itself gave up.
#[async_trait]
pub trait Platform: Send + Sync {
    /// List inbox threads.
    async fn fetch_inbox(&self) -> Result<Vec<ThreadSummary>, PlatformError>;

    /// Raw items of a thread, newest first, exactly as the platform sent them.
    async fn fetch_thread_items(
        &self,
        thread_id: &str,
    ) -> Result<Vec<serde_json::Value>, PlatformError>;

    /// Current members and native admins of a thread.
    async fn fetch_thread_state(&self, thread_id: &str) -> Result<ThreadState, PlatformError>;

    /// Remove a member from a thread.
    async fn remove_member(&self, thread_id: &str, user_id: &str) -> Result<bool, PlatformError>;

    /// Add a member to a thread.
    async fn add_member(&self, thread_id: &str, user_id: &str) -> Result<bool, PlatformError>;

    /// Post a text message, optionally as a reply to an item.
    async fn send_message(
        &self,
        thread_id: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<bool, PlatformError>;

    /// Send a private message to a single user.
    async fn send_direct(&self, user_id: &str, text: &str) -> Result<bool, PlatformError>;

    /// Leave a thread.
    async fn leave_thread(&self, thread_id: &str) -> Result<bool, PlatformError>;
}
