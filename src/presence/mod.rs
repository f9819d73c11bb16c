// Presence: who is connected to a topic, per identity

mod table;
mod tracker;

#[cfg(test)]
mod tests;

pub use table::PresenceTable;
pub use tracker::{PresenceTracker, DEFAULT_MAX_PENDING_DIFFS};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Metadata for one live connection of an identity.
///
/// Wire names follow the presence sub-protocol (`phx_ref`, `user_name`,
/// `online_at`); anything else the transport attaches is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Unique per connection, stable for its lifetime
    #[serde(rename = "phx_ref")]
    pub session_ref: String,

    #[serde(rename = "user_name")]
    pub identity: String,

    /// Unix seconds at which the session joined
    #[serde(rename = "online_at", default)]
    pub joined_at: i64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionMeta {
    pub fn new(
        session_ref: impl Into<String>,
        identity: impl Into<String>,
        joined_at: i64,
    ) -> Self {
        Self {
            session_ref: session_ref.into(),
            identity: identity.into(),
            joined_at,
            extra: Map::new(),
        }
    }
}

/// All sessions of one identity as carried on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub metas: Vec<SessionMeta>,
}

/// Full presence table: identity -> sessions.
pub type PresenceState = BTreeMap<String, PresenceEntry>;

/// Incremental change to a presence table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceDiff {
    #[serde(default)]
    pub joins: PresenceState,
    #[serde(default)]
    pub leaves: PresenceState,
}

impl PresenceDiff {
    pub fn is_empty(&self) -> bool {
        self.joins.is_empty() && self.leaves.is_empty()
    }
}

/// Projection of the presence table into identity -> ordered sessions.
///
/// Never holds an identity with zero sessions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceMap {
    identities: BTreeMap<String, Vec<SessionMeta>>,
}

impl PresenceMap {
    /// Project a raw table, dropping identities with no sessions.
    pub fn project<'a, I>(table: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a Vec<SessionMeta>)>,
    {
        let identities = table
            .into_iter()
            .filter(|(_, sessions)| !sessions.is_empty())
            .map(|(identity, sessions)| (identity.clone(), sessions.clone()))
            .collect();
        Self { identities }
    }

    pub fn get(&self, identity: &str) -> Option<&[SessionMeta]> {
        self.identities.get(identity).map(|sessions| sessions.as_slice())
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.identities.contains_key(identity)
    }

    /// Number of distinct identities online
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<SessionMeta>)> {
        self.identities.iter()
    }

    /// Flatten into one row per session, tagging the viewer's own sessions.
    pub fn rows(&self, viewer: &str) -> Vec<PresenceRow> {
        self.identities
            .values()
            .flat_map(|sessions| sessions.iter())
            .map(|meta| PresenceRow {
                is_self: meta.identity == viewer,
                identity: meta.identity.clone(),
                session_ref: meta.session_ref.clone(),
            })
            .collect()
    }
}

/// One rendered line of the "who's online" list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRow {
    pub is_self: bool,
    pub identity: String,
    pub session_ref: String,
}
