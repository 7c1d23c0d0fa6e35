//! Slash commands posted in group threads.
//!
//! Verbs accept their Arabic forms and English aliases. Each verb has a
//! [`Gate`]; callers that fail it are dropped without a reply, as are
//! non-developer commands in threads where the bot is not activated.

use crate::platform::PlatformError;
use crate::state::StateError;

mod handlers;
mod target;

pub use handlers::{dispatch, CommandContext, Outcome};
pub use target::resolve_target;

/// Who may run a verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Configured developers only.
    Developer,
    /// Developers and the recognised owner.
    DeveloperOrOwner,
    /// Owner, bot-admins, native admins and developers.
    Authorized,
    /// Any member.
    Member,
}

/// Supported command verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Activate the bot in the thread.
    Activate,
    /// Deactivate the bot in the thread.
    Deactivate,
    /// Make the bot leave the thread.
    Leave,
    /// Recognise the group owner.
    Owner,
    /// Recognise a co-owner.
    CoOwner,
    /// Grant bot-admin.
    Admin,
    /// Revoke bot-admin.
    Unadmin,
    /// Remove a member.
    Kick,
    /// Add a member.
    Accept,
    /// Escalate a complaint to the admins.
    Ticket,
}

const VERBS: &[(&str, Verb)] = &[
    ("/تفعيل", Verb::Activate),
    ("/activate", Verb::Activate),
    ("/تعطيل", Verb::Deactivate),
    ("/deactivate", Verb::Deactivate),
    ("/غادر", Verb::Leave),
    ("/leave", Verb::Leave),
    ("/تعرف", Verb::Owner),
    ("/owner", Verb::Owner),
    ("/مالك", Verb::CoOwner),
    ("/coowner", Verb::CoOwner),
    ("/ادمن", Verb::Admin),
    ("/admin", Verb::Admin),
    ("/سحب", Verb::Unadmin),
    ("/unadmin", Verb::Unadmin),
    ("/طرد", Verb::Kick),
    ("/kik", Verb::Kick),
    ("/kick", Verb::Kick),
    ("/قبول", Verb::Accept),
    ("/accept", Verb::Accept),
    ("/تكت", Verb::Ticket),
    ("/ticket", Verb::Ticket),
];

impl Verb {
    /// Look up a verb token such as `/kick`. English aliases ignore case.
    pub fn from_token(token: &str) -> Option<Self> {
        let lowered = token.to_lowercase();
        VERBS
            .iter()
            .find(|(name, _)| *name == lowered)
            .map(|(_, verb)| *verb)
    }

    /// Who may run this verb.
    pub fn gate(self) -> Gate {
        match self {
            Self::Activate | Self::Deactivate | Self::Leave | Self::Owner => Gate::Developer,
            Self::CoOwner | Self::Admin | Self::Unadmin => Gate::DeveloperOrOwner,
            Self::Kick | Self::Accept => Gate::Authorized,
            Self::Ticket => Gate::Member,
        }
    }

    /// Whether the verb works in threads where the bot is not activated.
    pub fn works_when_inactive(self) -> bool {
        self.gate() == Gate::Developer
    }
}

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The verb.
    pub verb: Verb,
    /// Text after the verb, trimmed.
    pub args: String,
}

/// Parse a message body. Returns `None` for anything that is not a known verb.
pub fn parse(body: &str) -> Option<Command> {
    let body = body.trim();
    if !body.starts_with('/') {
        return None;
    }
    let (token, rest) = body
        .split_once(char::is_whitespace)
        .unwrap_or((body, ""));
    Some(Command {
        verb: Verb::from_token(token)?,
        args: rest.trim().to_owned(),
    })
}

/// Errors that abort a command after it was authorized.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// A privilege change could not be saved.
    #[error(transparent)]
    State(#[from] StateError),
    /// A platform call needed to complete the command failed.
    #[error(transparent)]
    Platform(#[from] PlatformError),
}
