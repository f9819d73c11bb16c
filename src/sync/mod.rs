// Client-side roster reconciliation

mod reconciler;


pub use reconciler::{Applied, Reconciler, SyncPhase, DEFAULT_MAX_PENDING};

use crate::entity::Roster;
use crate::protocol::{AckPayload, ClientEvent, Operation, SyncEnvelope};
use serde_json::Value;
use std::fmt;

/// Fold one envelope into a roster.
///
/// - snapshot: the roster becomes exactly the snapshot contents
/// - create/update: upsert by id, in place if present, appended otherwise
/// - delete: remove by id, no-op if absent
pub fn apply(mut roster: Roster, envelope: &SyncEnvelope) -> Roster {
    match envelope {
        SyncEnvelope::Snapshot(payload) => Roster::from_entries(payload.entities.clone()),
        SyncEnvelope::Mutation { operation, payload } => {
            match operation {
                Operation::Create | Operation::Update => {
                    roster.upsert(payload.superhero.clone());
                }
                Operation::Delete => {
                    roster.remove(&payload.superhero.id);
                }
            }
            roster
        }
    }
}

/// The acknowledgment owed for `envelope`, whatever its effect was.
pub fn acknowledgment(envelope: &SyncEnvelope) -> ClientEvent {
    ClientEvent::MessageAck(AckPayload::received(envelope.message_id()))
}

/// Reconciliation errors
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Server denied the subscription; carries its reason payload
    JoinRefused(Value),
    /// Envelope arrived while no subscription was live
    NotJoined { message_id: String },
    /// Join requested while a join is already in flight or live
    AlreadyJoined,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::JoinRefused(reason) => write!(f, "join refused: {}", reason),
            SyncError::NotJoined { message_id } => {
                write!(f, "envelope '{}' received outside a live subscription", message_id)
            }
            SyncError::AlreadyJoined => write!(f, "subscription already joining or joined"),
        }
    }
}

impl std::error::Error for SyncError {}
