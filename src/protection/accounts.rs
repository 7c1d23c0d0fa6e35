//! The accounts the bot can act through.

use std::sync::Arc;

use crate::platform::{Platform, ThreadState};

/// Which account performs a corrective call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Account {
    /// The bot account.
    Primary,
    /// The assistant account.
    Assistant,
}

/// Chosen account for one remediation.
pub struct Actuator<'a> {
    /// Which account was chosen.
    pub account: Account,
    /// Client for that account.
    pub platform: &'a dyn Platform,
    /// Whether the chosen account is known to hold admin rights.
    pub capable: bool,
}

/// The bot account and the optional assistant account.
#[derive(Clone)]
pub struct Accounts {
    primary: Arc<dyn Platform>,
    bot_id: String,
    assistant: Option<Arc<dyn Platform>>,
    assistant_id: Option<String>,
}

impl std::fmt::Debug for Accounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accounts")
            .field("bot_id", &self.bot_id)
            .field("assistant", &self.assistant.is_some())
            .field("assistant_id", &self.assistant_id)
            .finish()
    }
}

impl Accounts {
    /// Bot account only.
    pub fn new(primary: Arc<dyn Platform>, bot_id: impl Into<String>) -> Self {
        Self {
            primary,
            bot_id: bot_id.into(),
            assistant: None,
            assistant_id: None,
        }
    }

    /// Add an assistant account. Without an id its admin status is unknown
    /// and it is assumed capable.
    #[must_use]
    pub fn with_assistant(mut self, assistant: Arc<dyn Platform>, user_id: Option<String>) -> Self {
        self.assistant = Some(assistant);
        self.assistant_id = user_id;
        self
    }

    /// The bot account's client; all reads and announcements use it.
    pub fn primary(&self) -> &dyn Platform {
        self.primary.as_ref()
    }

    /// User id of the bot account.
    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    /// User id of the assistant account, when configured.
    pub fn assistant_id(&self) -> Option<&str> {
        self.assistant_id.as_deref()
    }

    /// Whether `user_id` is one of the bot's own accounts.
    pub fn is_own_account(&self, user_id: &str) -> bool {
        user_id == self.bot_id || self.assistant_id.as_deref() == Some(user_id)
    }

    /// Pick the account to act through given the live admin list.
    ///
    /// The bot account while it is admin, otherwise the assistant while it
    /// is (or may be) admin, otherwise the bot account on a best-effort basis.
    pub fn actuator(&self, live: &ThreadState) -> Actuator<'_> {
        if live.is_admin(&self.bot_id) {
            return Actuator {
                account: Account::Primary,
                platform: self.primary.as_ref(),
                capable: true,
            };
        }
        if let Some(assistant) = &self.assistant {
            let capable = self
                .assistant_id
                .as_deref()
                .map_or(true, |id| live.is_admin(id));
            if capable {
                return Actuator {
                    account: Account::Assistant,
                    platform: assistant.as_ref(),
                    capable: true,
                };
            }
        }
        Actuator {
            account: Account::Primary,
            platform: self.primary.as_ref(),
            capable: false,
        }
    }
}
