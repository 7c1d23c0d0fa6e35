//! Shared identity types.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A platform user: opaque id plus an optional display handle.
///
/// Equality and hashing use the id only. Handles can change at any time, so
/// they are carried for messages and never for comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Platform user id.
    pub id: String,
    /// Display handle without the leading `@`, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
}

impl Identity {
    /// Identity known only by id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handle: None,
        }
    }

    /// Identity with a display handle.
    pub fn with_handle(id: impl Into<String>, handle: impl Into<String>) -> Self {
        let handle = handle.into();
        Self {
            id: id.into(),
            handle: if handle.is_empty() { None } else { Some(handle) },
        }
    }

    /// Text used to mention this user in a thread message.
    ///
    /// Falls back to the raw id when no handle is known.
    pub fn mention(&self) -> String {
        match &self.handle {
            Some(handle) => format!("@{handle}"),
            None => self.id.clone(),
        }
    }

    /// Whether this identity has the given id.
    pub fn is(&self, id: &str) -> bool {
        self.id == id
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.handle {
            Some(handle) => write!(f, "{}(@{handle})", self.id),
            None => f.write_str(&self.id),
        }
    }
}
