use super::{PresenceDiff, PresenceMap, PresenceRow, PresenceState, SessionMeta};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, error, warn};

/// Default bound on diffs held while waiting for the first state
pub const DEFAULT_MAX_PENDING_DIFFS: usize = 64;

/// Client-side mirror of a topic's presence table.
///
/// The transport owns the canonical table; this tracker only mirrors the
/// `presence_state` / `presence_diff` messages it is sent and projects them
/// into a [`PresenceMap`] after every sync.
#[derive(Debug)]
pub struct PresenceTracker {
    table: BTreeMap<String, Vec<SessionMeta>>,

    /// Set once a full state has been received for the current join
    synced: bool,

    /// Diffs received before the first state of the current join
    pending_diffs: VecDeque<PresenceDiff>,
    max_pending_diffs: usize,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING_DIFFS)
    }

    pub fn with_max_pending(max_pending_diffs: usize) -> Self {
        Self {
            table: BTreeMap::new(),
            synced: false,
            pending_diffs: VecDeque::new(),
            max_pending_diffs: max_pending_diffs.max(1),
        }
    }

    /// Forget sync status for a fresh join.
    ///
    /// The mirrored table is kept until the next state replaces it.
    pub fn reset(&mut self) {
        self.synced = false;
        self.pending_diffs.clear();
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Replace the mirrored table with a full state, then replay any diffs
    /// that raced ahead of it.
    pub fn sync_state(&mut self, state: PresenceState) -> PresenceMap {
        self.table = state
            .into_iter()
            .filter(|(_, entry)| !entry.metas.is_empty())
            .map(|(identity, entry)| (identity, entry.metas))
            .collect();
        self.synced = true;

        let pending = std::mem::take(&mut self.pending_diffs);
        if !pending.is_empty() {
            debug!(count = pending.len(), "Replaying presence diffs received before state");
        }
        for diff in pending {
            self.merge_diff(diff);
        }

        self.list()
    }

    /// Apply an incremental diff.
    ///
    /// Returns `None` when the diff was buffered because no state has
    /// arrived yet for this join.
    pub fn sync_diff(&mut self, diff: PresenceDiff) -> Option<PresenceMap> {
        if !self.synced {
            warn!("Presence diff arrived before state, buffering");
            if self.pending_diffs.len() >= self.max_pending_diffs
                && self.pending_diffs.pop_front().is_some()
            {
                error!(
                    max_pending = self.max_pending_diffs,
                    "Presence diff buffer full, dropping oldest diff"
                );
            }
            self.pending_diffs.push_back(diff);
            return None;
        }

        self.merge_diff(diff);
        Some(self.list())
    }

    /// Current projection: identity -> sessions, no empty identities.
    pub fn list(&self) -> PresenceMap {
        PresenceMap::project(self.table.iter())
    }

    /// One row per session, `is_self` set for sessions of `viewer`.
    pub fn rows(&self, viewer: &str) -> Vec<PresenceRow> {
        self.list().rows(viewer)
    }

    fn merge_diff(&mut self, diff: PresenceDiff) {
        for (identity, entry) in diff.joins {
            let joined_refs: Vec<&str> = entry
                .metas
                .iter()
                .map(|meta| meta.session_ref.as_str())
                .collect();

            // Sessions already known stay ahead of the newly joined ones
            let mut sessions: Vec<SessionMeta> = self
                .table
                .get(&identity)
                .map(|current| {
                    current
                        .iter()
                        .filter(|meta| !joined_refs.contains(&meta.session_ref.as_str()))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            sessions.extend(entry.metas);

            if !sessions.is_empty() {
                self.table.insert(identity, sessions);
            }
        }

        for (identity, entry) in diff.leaves {
            let Some(current) = self.table.get_mut(&identity) else {
                continue;
            };

            current.retain(|meta| {
                !entry
                    .metas
                    .iter()
                    .any(|left| left.session_ref == meta.session_ref)
            });

            if current.is_empty() {
                self.table.remove(&identity);
            }
        }
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}
