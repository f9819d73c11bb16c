use super::{PresenceDiff, PresenceEntry, PresenceState, SessionMeta};
use std::collections::BTreeMap;

/// Canonical presence table for one topic, held by the server.
///
/// Every mutation returns the diff that subscribers need to stay in step.
#[derive(Debug, Default)]
pub struct PresenceTable {
    entries: BTreeMap<String, Vec<SessionMeta>>,
}

impl PresenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Re-tracking a known session ref replaces its meta.
    pub fn track(&mut self, meta: SessionMeta) -> PresenceDiff {
        let sessions = self.entries.entry(meta.identity.clone()).or_default();
        match sessions
            .iter()
            .position(|existing| existing.session_ref == meta.session_ref)
        {
            Some(index) => sessions[index] = meta.clone(),
            None => sessions.push(meta.clone()),
        }

        let mut diff = PresenceDiff::default();
        diff.joins.insert(
            meta.identity.clone(),
            PresenceEntry { metas: vec![meta] },
        );
        diff
    }

    /// Drop a session. Returns `None` if it was not tracked.
    pub fn untrack(&mut self, identity: &str, session_ref: &str) -> Option<PresenceDiff> {
        let sessions = self.entries.get_mut(identity)?;
        let index = sessions
            .iter()
            .position(|meta| meta.session_ref == session_ref)?;
        let removed = sessions.remove(index);

        if sessions.is_empty() {
            self.entries.remove(identity);
        }

        let mut diff = PresenceDiff::default();
        diff.leaves.insert(
            identity.to_string(),
            PresenceEntry {
                metas: vec![removed],
            },
        );
        Some(diff)
    }

    /// Full table in wire shape
    pub fn state(&self) -> PresenceState {
        self.entries
            .iter()
            .map(|(identity, metas)| {
                (
                    identity.clone(),
                    PresenceEntry {
                        metas: metas.clone(),
                    },
                )
            })
            .collect()
    }

    /// Sessions currently tracked for `identity`
    pub fn sessions(&self, identity: &str) -> &[SessionMeta] {
        self.entries
            .get(identity)
            .map(|metas| metas.as_slice())
            .unwrap_or(&[])
    }

    pub fn session_count(&self) -> usize {
        self.entries.values().map(|metas| metas.len()).sum()
    }
}
