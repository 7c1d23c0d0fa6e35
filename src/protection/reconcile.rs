//! Snapshot diffing and loss classification.
//!
//! Pure functions; [`super::Guardian`] performs the platform calls.

use std::collections::BTreeSet;
use std::fmt;

/// Why an admin right disappeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossClass {
    /// No actor could be attributed; logged only.
    Unattributed,
    /// The admin removed themselves.
    SelfRemoval,
    /// One of the bot's own accounts acted.
    ByOwnAccount,
    /// The owner removed the bot or assistant account.
    ByOwner,
    /// The owner demoted a co-owner.
    SecondaryDemotedByOwner,
    /// Someone other than the owner removed the owner.
    OwnerUsurped,
    /// Someone other than the owner removed the bot account.
    BotStripped,
    /// Someone other than the owner removed the assistant account.
    AssistantStripped,
    /// Someone other than the owner removed a co-owner.
    SecondaryOwnerStolen,
    /// Anyone, the owner included, removed another admin.
    AdminStolen,
}

impl LossClass {
    /// Whether the loss calls for stripping the actor and restoring the victim.
    pub fn needs_remediation(self) -> bool {
        matches!(
            self,
            Self::OwnerUsurped
                | Self::BotStripped
                | Self::AssistantStripped
                | Self::SecondaryOwnerStolen
                | Self::AdminStolen
        )
    }
}

impl fmt::Display for LossClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unattributed => "unattributed",
            Self::SelfRemoval => "self_removal",
            Self::ByOwnAccount => "by_own_account",
            Self::ByOwner => "by_owner",
            Self::SecondaryDemotedByOwner => "secondary_demoted_by_owner",
            Self::OwnerUsurped => "owner_usurped",
            Self::BotStripped => "bot_stripped",
            Self::AssistantStripped => "assistant_stripped",
            Self::SecondaryOwnerStolen => "secondary_owner_stolen",
            Self::AdminStolen => "admin_stolen",
        };
        f.write_str(name)
    }
}

/// Who is who in a thread, for classification.
#[derive(Debug, Clone, Copy)]
pub struct Roles<'a> {
    /// Recognised owner.
    pub owner: Option<&'a str>,
    /// Recognised co-owners.
    pub secondary_owners: &'a BTreeSet<String>,
    /// Bot account id.
    pub bot_id: &'a str,
    /// Assistant account id.
    pub assistant_id: Option<&'a str>,
}

/// Classify the loss of `lost`'s admin right by `actor`.
pub fn classify(lost: &str, actor: Option<&str>, roles: &Roles<'_>) -> LossClass {
    let Some(actor) = actor.filter(|a| !a.is_empty()) else {
        return LossClass::Unattributed;
    };
    if actor == lost {
        return LossClass::SelfRemoval;
    }
    if actor == roles.bot_id || roles.assistant_id == Some(actor) {
        return LossClass::ByOwnAccount;
    }

    let by_owner = roles.owner == Some(actor);
    if roles.owner == Some(lost) {
        LossClass::OwnerUsurped
    } else if roles.secondary_owners.contains(lost) {
        if by_owner {
            LossClass::SecondaryDemotedByOwner
        } else {
            LossClass::SecondaryOwnerStolen
        }
    } else if lost == roles.bot_id || roles.assistant_id == Some(lost) {
        if by_owner {
            LossClass::ByOwner
        } else if lost == roles.bot_id {
            LossClass::BotStripped
        } else {
            LossClass::AssistantStripped
        }
    } else {
        LossClass::AdminStolen
    }
}

/// Ids in `previous` that are missing from `current`, in snapshot order.
pub fn removed_admins(previous: &[String], current: &[String]) -> Vec<String> {
    previous
        .iter()
        .filter(|id| !current.contains(id))
        .cloned()
        .collect()
}

/// In-thread announcement for a remediated loss.
pub fn announcement(class: LossClass, actor: &str, lost: &str) -> String {
    match class {
        LossClass::OwnerUsurped => format!(
            "{actor} removed the owner's admin rights. I revoked theirs and restored the owner {lost}."
        ),
        LossClass::BotStripped => format!(
            "{actor} removed my admin rights. I revoked theirs and restored my own."
        ),
        LossClass::AssistantStripped => format!(
            "{actor} removed my assistant's admin rights. I revoked theirs and restored the assistant."
        ),
        LossClass::SecondaryOwnerStolen => format!(
            "{actor} removed co-owner {lost}'s admin rights. I revoked theirs and restored {lost}."
        ),
        _ => format!("{actor} removed {lost}'s admin rights. I revoked theirs and restored {lost}."),
    }
}
