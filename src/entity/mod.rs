use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;


/// Opaque entity identifier.
///
/// The source of record may hand out integer keys or string keys; both are
/// accepted on the wire and compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Text(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(id) => write!(f, "{}", id),
            EntityId::Text(id) => write!(f, "{}", id),
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Int(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::Text(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        EntityId::Text(id)
    }
}

impl EntityId {
    /// Parse a path segment: integers stay integers, anything else is text.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(id) => EntityId::Int(id),
            Err(_) => EntityId::Text(raw.to_string()),
        }
    }
}

/// A roster entry.
///
/// Only `id` takes part in matching; every other field is replaced wholesale
/// on update. Delete envelopes may carry nothing but the id, so the
/// descriptive fields default to empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Superhero {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub power: String,
    /// Additional descriptive fields, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Superhero {
    pub fn new(
        id: impl Into<EntityId>,
        name: impl Into<String>,
        location: impl Into<String>,
        power: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: location.into(),
            power: power.into(),
            extra: Map::new(),
        }
    }
}

/// Ordered collection of superheroes, unique by id.
///
/// Insertion order is preserved across updates: an update replaces the
/// record where it stands instead of moving it to the end. There is no
/// implicit sort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    entries: Vec<Superhero>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from a snapshot list.
    ///
    /// A repeated id keeps the position of its first occurrence and the
    /// contents of its last one, so the no-duplicate invariant holds even
    /// for a malformed snapshot.
    pub fn from_entries(entries: Vec<Superhero>) -> Self {
        let mut roster = Self::new();
        for hero in entries {
            roster.upsert(hero);
        }
        roster
    }

    /// Replace the record with the same id in place, or append it.
    ///
    /// Returns true when an existing record was replaced.
    pub fn upsert(&mut self, hero: Superhero) -> bool {
        match self.position(&hero.id) {
            Some(index) => {
                self.entries[index] = hero;
                true
            }
            None => {
                self.entries.push(hero);
                false
            }
        }
    }

    /// Remove the record with `id`. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: &EntityId) -> Option<Superhero> {
        self.position(id).map(|index| self.entries.remove(index))
    }

    /// Discard current contents and take `entries` as the new state.
    pub fn replace_all(&mut self, entries: Vec<Superhero>) {
        *self = Self::from_entries(entries);
    }

    pub fn get(&self, id: &EntityId) -> Option<&Superhero> {
        self.entries.iter().find(|hero| &hero.id == id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Superhero> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Superhero] {
        &self.entries
    }

    pub fn to_vec(&self) -> Vec<Superhero> {
        self.entries.clone()
    }

    fn position(&self, id: &EntityId) -> Option<usize> {
        self.entries.iter().position(|hero| &hero.id == id)
    }
}
