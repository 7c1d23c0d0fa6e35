//! Typed events derived from raw thread items.
//!
//! [`normalize`] is the only place raw item JSON is inspected. Everything
//! downstream matches on [`EventKind`].

use chrono::{DateTime, Utc};

use crate::types::Identity;

mod normalize;

pub use normalize::normalize;

/// One normalized thread item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Item id used for deduplication. Empty when the item carried neither an
    /// id nor a timestamp.
    pub id: String,
    /// Platform timestamp in microseconds since the epoch.
    pub timestamp: Option<i64>,
    /// What happened.
    pub kind: EventKind,
}

/// Closed set of event kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A text message.
    Text {
        /// Author.
        from: Identity,
        /// Trimmed message body.
        body: String,
        /// Author of the message this one replies to.
        reply_to: Option<Identity>,
    },
    /// Members were removed from the thread.
    MemberRemoved {
        /// Who removed them, when reported.
        actor: Option<Identity>,
        /// Removed members.
        targets: Vec<Identity>,
    },
    /// Members were added to the thread.
    MemberAdded {
        /// Who added them, when reported.
        actor: Option<Identity>,
        /// Added members.
        targets: Vec<Identity>,
    },
    /// An action-log entry describing a change to the group.
    AdminListChanged {
        /// Who caused the change, when reported.
        actor: Option<Identity>,
        /// Classified change.
        change: GroupChange,
        /// Lowercased description text.
        description: String,
    },
    /// Any other item type, or an item that could not be parsed.
    Unknown {
        /// The reported item type, or `"missing"`.
        raw_type: String,
    },
}

/// Group changes recognised in action-log descriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupChange {
    /// The actor left the group.
    LeftGroup,
    /// The group was renamed.
    Renamed {
        /// New group name.
        name: String,
    },
    /// The group photo changed.
    PhotoChanged,
    /// Members were added.
    MembersAdded,
    /// Unrecognised description.
    Other,
}

impl Event {
    /// The actor the reconciliation engine may attribute an admin loss to.
    ///
    /// Only removals and action-log entries carry a usable actor.
    pub fn attributed_actor(&self) -> Option<&Identity> {
        match &self.kind {
            EventKind::MemberRemoved { actor, .. }
            | EventKind::AdminListChanged { actor, .. } => actor.as_ref(),
            _ => None,
        }
    }

    /// Text body, when this is a message.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Text { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Timestamp as a UTC time, when present and in range.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(DateTime::from_timestamp_micros)
    }
}
