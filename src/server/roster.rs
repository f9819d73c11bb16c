use crate::entity::{EntityId, Roster, Superhero};
use crate::protocol::{HydratePayload, MutationPayload, Operation, SyncEnvelope};
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

/// Server-of-record for the roster.
///
/// Mutations are applied and broadcast while the write lock is held, so
/// every subscriber receives them in the order they were applied. A
/// snapshot and its follow-up stream are taken under one read lock so no
/// mutation falls between them.
pub struct RosterEngine {
    roster: RwLock<Roster>,

    /// Broadcast channel for roster mutations
    mutation_tx: broadcast::Sender<SyncEnvelope>,
}

impl RosterEngine {
    pub fn new(capacity: usize) -> Self {
        Self::with_entries(Vec::new(), capacity)
    }

    /// Engine seeded with an initial roster
    pub fn with_entries(entries: Vec<Superhero>, capacity: usize) -> Self {
        let (mutation_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            roster: RwLock::new(Roster::from_entries(entries)),
            mutation_tx,
        }
    }

    pub fn list(&self) -> Vec<Superhero> {
        self.read().to_vec()
    }

    pub fn get(&self, id: &EntityId) -> Option<Superhero> {
        self.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Add a new superhero. Fails if the id is taken.
    pub fn create(&self, hero: Superhero) -> Result<SyncEnvelope, RosterError> {
        let mut roster = self.write();
        if roster.contains(&hero.id) {
            return Err(RosterError::AlreadyExists(hero.id));
        }
        roster.upsert(hero.clone());
        Ok(self.publish(Operation::Create, hero))
    }

    /// Add a superhero under the next free integer id
    pub fn create_next(&self, mut hero: Superhero) -> Result<SyncEnvelope, RosterError> {
        let mut roster = self.write();
        let next = roster
            .iter()
            .filter_map(|entry| match entry.id {
                EntityId::Int(id) => Some(id),
                EntityId::Text(_) => None,
            })
            .max()
            .unwrap_or(0)
            .checked_add(1)
            .ok_or(RosterError::IdSpaceExhausted)?;
        hero.id = EntityId::Int(next);
        roster.upsert(hero.clone());
        Ok(self.publish(Operation::Create, hero))
    }

    /// Replace an existing superhero. Fails if the id is unknown.
    pub fn update(&self, hero: Superhero) -> Result<SyncEnvelope, RosterError> {
        let mut roster = self.write();
        if !roster.contains(&hero.id) {
            return Err(RosterError::NotFound(hero.id));
        }
        roster.upsert(hero.clone());
        Ok(self.publish(Operation::Update, hero))
    }

    /// Remove a superhero. Fails if the id is unknown.
    pub fn delete(&self, id: &EntityId) -> Result<SyncEnvelope, RosterError> {
        let mut roster = self.write();
        let removed = roster
            .remove(id)
            .ok_or_else(|| RosterError::NotFound(id.clone()))?;
        Ok(self.publish(Operation::Delete, removed))
    }

    /// Current roster plus a receiver positioned right after it.
    pub fn snapshot_and_subscribe(&self) -> (HydratePayload, broadcast::Receiver<SyncEnvelope>) {
        let roster = self.read();
        let rx = self.mutation_tx.subscribe();
        let snapshot = HydratePayload {
            entities: roster.to_vec(),
            message_id: new_message_id(),
        };
        (snapshot, rx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.mutation_tx.receiver_count()
    }

    /// Must be called with the write lock held
    fn publish(&self, operation: Operation, superhero: Superhero) -> SyncEnvelope {
        let envelope = SyncEnvelope::Mutation {
            operation,
            payload: MutationPayload {
                superhero,
                message_id: new_message_id(),
            },
        };

        // No subscribers is fine
        let delivered = self.mutation_tx.send(envelope.clone()).unwrap_or(0);

        info!(
            operation = operation.event_name(),
            message_id = %envelope.message_id(),
            subscribers = delivered,
            "Roster mutation broadcast"
        );

        envelope
    }

    fn read(&self) -> RwLockReadGuard<'_, Roster> {
        self.roster.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Roster> {
        self.roster.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// UUIDv7: time-ordered, unique per envelope
pub fn new_message_id() -> String {
    Uuid::now_v7().to_string()
}

/// Roster mutation errors
#[derive(Debug, Clone, PartialEq)]
pub enum RosterError {
    AlreadyExists(EntityId),
    NotFound(EntityId),
    /// The highest integer id is already `i64::MAX`
    IdSpaceExhausted,
}

impl fmt::Display for RosterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RosterError::AlreadyExists(id) => write!(f, "superhero '{}' already exists", id),
            RosterError::NotFound(id) => write!(f, "superhero '{}' not found", id),
            RosterError::IdSpaceExhausted => write!(f, "no free integer id left"),
        }
    }
}

impl std::error::Error for RosterError {}
