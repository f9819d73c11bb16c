use super::{acknowledgment, apply, SyncError};
use crate::channel::Pusher;
use crate::entity::Roster;
use crate::protocol::{Operation, SyncEnvelope};
use serde_json::Value;
use std::collections::VecDeque;
use tracing::{debug, error, info, warn};

/// Default bound on mutations held while waiting for the snapshot
pub const DEFAULT_MAX_PENDING: usize = 256;

/// Subscription lifecycle as seen by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Unsubscribed,
    Joining,
    Joined { hydrated: bool },
}

/// What handling an envelope did to the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Snapshot replaced the roster; `replayed` buffered mutations followed
    Hydrated { replayed: usize },
    /// Existing record replaced in place
    Replaced,
    /// New record appended
    Appended,
    /// Record removed
    Removed,
    /// Delete of an id that was not present
    Unchanged,
    /// Mutation held until the snapshot arrives
    Buffered,
}

/// Owns one topic subscription's roster.
///
/// Every envelope handled while joined is acknowledged exactly once,
/// including no-ops and buffered mutations. A mutation that arrives before
/// the snapshot is a protocol violation: it is logged, counted, buffered,
/// and replayed over the snapshot in arrival order.
#[derive(Debug)]
pub struct Reconciler {
    roster: Roster,
    phase: SyncPhase,
    pending: VecDeque<SyncEnvelope>,
    max_pending: usize,
    violations: u64,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING)
    }

    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            roster: Roster::new(),
            phase: SyncPhase::Unsubscribed,
            pending: VecDeque::new(),
            max_pending: max_pending.max(1),
            violations: 0,
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn is_hydrated(&self) -> bool {
        self.phase == SyncPhase::Joined { hydrated: true }
    }

    /// Mutations seen before hydration since construction
    pub fn violations(&self) -> u64 {
        self.violations
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Join requested on the transport.
    pub fn begin_join(&mut self) -> Result<(), SyncError> {
        if self.phase != SyncPhase::Unsubscribed {
            return Err(SyncError::AlreadyJoined);
        }
        self.phase = SyncPhase::Joining;
        self.pending.clear();
        Ok(())
    }

    /// Server accepted the join; the snapshot is next.
    pub fn join_ok(&mut self) {
        self.phase = SyncPhase::Joined { hydrated: false };
        info!(entities = self.roster.len(), "Joined, awaiting snapshot");
    }

    /// Server refused the join. State stays as it was before the attempt.
    pub fn join_refused(&mut self, reason: Value) -> SyncError {
        warn!(reason = %reason, "Join refused");
        self.phase = SyncPhase::Unsubscribed;
        self.pending.clear();
        SyncError::JoinRefused(reason)
    }

    /// Subscription ended, voluntarily or not.
    ///
    /// The roster is kept; the next join's snapshot replaces it.
    pub fn leave(&mut self) {
        if !self.pending.is_empty() {
            warn!(dropped = self.pending.len(), "Leaving with buffered mutations");
        }
        self.phase = SyncPhase::Unsubscribed;
        self.pending.clear();
    }

    /// Reconcile one envelope and acknowledge it.
    pub fn handle<P>(&mut self, envelope: SyncEnvelope, pusher: &P) -> Result<Applied, SyncError>
    where
        P: Pusher + ?Sized,
    {
        let hydrated = match self.phase {
            SyncPhase::Joined { hydrated } => hydrated,
            SyncPhase::Unsubscribed | SyncPhase::Joining => {
                return Err(SyncError::NotJoined {
                    message_id: envelope.message_id().to_string(),
                });
            }
        };

        let ack = acknowledgment(&envelope);

        let applied = if matches!(envelope, SyncEnvelope::Snapshot(_)) {
            self.hydrate(&envelope)
        } else if !hydrated {
            self.buffer(envelope);
            Applied::Buffered
        } else {
            self.mutate(&envelope)
        };

        if let Err(e) = pusher.push(ack) {
            warn!(error = %e, "Failed to push acknowledgment");
        }

        Ok(applied)
    }

    fn hydrate(&mut self, snapshot: &SyncEnvelope) -> Applied {
        let roster = std::mem::take(&mut self.roster);
        self.roster = apply(roster, snapshot);
        self.phase = SyncPhase::Joined { hydrated: true };

        let pending = std::mem::take(&mut self.pending);
        let replayed = pending.len();
        for envelope in pending {
            self.mutate(&envelope);
        }

        info!(
            entities = self.roster.len(),
            replayed = replayed,
            message_id = %snapshot.message_id(),
            "Roster hydrated"
        );

        Applied::Hydrated { replayed }
    }

    fn mutate(&mut self, envelope: &SyncEnvelope) -> Applied {
        let SyncEnvelope::Mutation { operation, payload } = envelope else {
            return Applied::Unchanged;
        };

        let id = &payload.superhero.id;
        let applied = match operation {
            Operation::Create | Operation::Update if self.roster.contains(id) => Applied::Replaced,
            Operation::Create | Operation::Update => Applied::Appended,
            Operation::Delete if self.roster.contains(id) => Applied::Removed,
            Operation::Delete => Applied::Unchanged,
        };

        let roster = std::mem::take(&mut self.roster);
        self.roster = apply(roster, envelope);

        debug!(
            operation = operation.event_name(),
            entity_id = %id,
            message_id = %payload.message_id,
            outcome = ?applied,
            "Applied mutation"
        );

        applied
    }

    fn buffer(&mut self, envelope: SyncEnvelope) {
        self.violations += 1;
        error!(
            message_id = %envelope.message_id(),
            "Protocol violation: mutation before snapshot, buffering until hydrated"
        );

        if self.pending.len() >= self.max_pending {
            if let Some(dropped) = self.pending.pop_front() {
                error!(
                    message_id = %dropped.message_id(),
                    max_pending = self.max_pending,
                    "Pre-snapshot buffer full, dropping oldest mutation"
                );
            }
        }
        self.pending.push_back(envelope);
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}
