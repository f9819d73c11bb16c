use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

/// Tracks which delivered envelopes each connection has acknowledged.
///
/// Purely informational: nothing is retried or throttled on a missing ack.
pub struct AckLedger {
    /// connection id -> message ids delivered but not yet acknowledged
    outstanding: DashMap<Uuid, HashSet<String>>,
    acknowledged_total: AtomicU64,
}

impl AckLedger {
    pub fn new() -> Self {
        Self {
            outstanding: DashMap::new(),
            acknowledged_total: AtomicU64::new(0),
        }
    }

    /// Record an envelope delivered to `connection`
    pub fn expect(&self, connection: Uuid, message_id: &str) {
        self.outstanding
            .entry(connection)
            .or_default()
            .insert(message_id.to_string());
    }

    /// Record an ack. Returns false for ids never delivered to `connection`
    /// or already acknowledged.
    pub fn acknowledge(&self, connection: Uuid, message_id: &str) -> bool {
        let matched = self
            .outstanding
            .get_mut(&connection)
            .map(|mut pending| pending.remove(message_id))
            .unwrap_or(false);

        if matched {
            self.acknowledged_total.fetch_add(1, Ordering::Relaxed);
        } else {
            debug!(
                connection = %connection,
                message_id = %message_id,
                "Ack for unknown or already acknowledged message"
            );
        }

        matched
    }

    pub fn outstanding(&self, connection: Uuid) -> usize {
        self.outstanding
            .get(&connection)
            .map(|pending| pending.len())
            .unwrap_or(0)
    }

    pub fn acknowledged_total(&self) -> u64 {
        self.acknowledged_total.load(Ordering::Relaxed)
    }

    /// Drop a closed connection's bookkeeping; returns how many envelopes
    /// it never acknowledged.
    pub fn forget(&self, connection: Uuid) -> usize {
        let unacked = self
            .outstanding
            .remove(&connection)
            .map(|(_, pending)| pending.len())
            .unwrap_or(0);

        if unacked > 0 {
            info!(connection = %connection, unacked = unacked, "Connection closed with unacknowledged envelopes");
        }

        unacked
    }
}

impl Default for AckLedger {
    fn default() -> Self {
        Self::new()
    }
}
