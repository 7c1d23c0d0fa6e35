use serde::Deserialize;
use serde_json::Value;

use super::{Event, EventKind, GroupChange};
use crate::platform::wire::{WireId, WireUser};
use crate::types::Identity;

const RENAMED_MARKER: &str = "changed the group name to";

#[derive(Debug, Deserialize)]
struct WireItem {
    #[serde(default)]
    item_type: Option<String>,
    #[serde(default)]
    user_id: Option<WireId>,
    #[serde(default)]
    actor_id: Option<WireId>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    users: Vec<WireTarget>,
    #[serde(default)]
    action_log: Option<WireActionLog>,
    #[serde(default)]
    replied_to_message: Option<WireReply>,
}

/// Removal and addition items list targets either as bare ids or as users.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTarget {
    Id(WireId),
    User(WireUser),
}

#[derive(Debug, Deserialize)]
struct WireActionLog {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    #[serde(default)]
    user_id: Option<WireId>,
}

/// Classify one raw thread item.
///
/// Never fails: anything that does not fit a known shape becomes
/// [`EventKind::Unknown`].
pub fn normalize(raw: &Value) -> Event {
    let timestamp = raw
        .get("timestamp")
        .and_then(|v| WireId::deserialize(v).ok())
        .and_then(|ts| ts.as_i64());
    let id = item_id(raw, timestamp);

    let kind = match WireItem::deserialize(raw) {
        Ok(item) => classify(item),
        Err(e) => {
            tracing::debug!(error = %e, "unparseable thread item");
            EventKind::Unknown {
                raw_type: raw
                    .get("item_type")
                    .and_then(Value::as_str)
                    .unwrap_or("missing")
                    .to_owned(),
            }
        }
    };

    Event {
        id,
        timestamp,
        kind,
    }
}

fn item_id(raw: &Value, timestamp: Option<i64>) -> String {
    if let Some(id) = raw
        .get("item_id")
        .and_then(|v| WireId::deserialize(v).ok())
        .map(WireId::into_string)
        .filter(|s| !s.is_empty())
    {
        return id;
    }
    timestamp.map(|ts| format!("ts:{ts}")).unwrap_or_default()
}

fn classify(item: WireItem) -> EventKind {
    let item_type = item.item_type.unwrap_or_else(|| "missing".to_owned());
    let author = identity(item.user_id);

    match item_type.as_str() {
        "text" => match author {
            Some(from) => EventKind::Text {
                from,
                body: item.text.unwrap_or_default().trim().to_owned(),
                reply_to: item
                    .replied_to_message
                    .and_then(|r| identity(r.user_id)),
            },
            None => EventKind::Unknown {
                raw_type: item_type,
            },
        },
        "remove_user" => EventKind::MemberRemoved {
            actor: identity(item.actor_id).or(author),
            targets: targets(item.users),
        },
        "add_user" => EventKind::MemberAdded {
            actor: identity(item.actor_id).or(author),
            targets: targets(item.users),
        },
        "action_log" => {
            let description = item
                .action_log
                .map(|a| a.description)
                .unwrap_or_default();
            EventKind::AdminListChanged {
                actor: identity(item.actor_id).or(author),
                change: group_change(&description),
                description: description.to_lowercase(),
            }
        }
        _ => EventKind::Unknown {
            raw_type: item_type,
        },
    }
}

fn identity(id: Option<WireId>) -> Option<Identity> {
    id.map(WireId::into_string)
        .filter(|s| !s.is_empty())
        .map(Identity::new)
}

fn targets(users: Vec<WireTarget>) -> Vec<Identity> {
    users
        .into_iter()
        .filter_map(|t| match t {
            WireTarget::Id(id) => identity(Some(id)),
            WireTarget::User(user) => user.into_identity(),
        })
        .collect()
}

fn group_change(description: &str) -> GroupChange {
    // ASCII lowercasing keeps byte offsets valid for slicing the original.
    let lower = description.to_ascii_lowercase();

    if lower.contains("left the group") {
        GroupChange::LeftGroup
    } else if let Some(pos) = lower.find(RENAMED_MARKER) {
        let start = pos.saturating_add(RENAMED_MARKER.len());
        let name = description
            .get(start..)
            .unwrap_or_default()
            .trim()
            .trim_matches(|c| matches!(c, '\'' | '"' | '.'))
            .trim()
            .to_owned();
        GroupChange::Renamed { name }
    } else if lower.contains("changed the group photo") {
        GroupChange::PhotoChanged
    } else if lower.contains("added") && lower.contains("to the group") {
        GroupChange::MembersAdded
    } else {
        GroupChange::Other
    }
}
