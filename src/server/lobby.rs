use crate::notification::Notification;
use crate::presence::{PresenceDiff, PresenceState, PresenceTable, SessionMeta};
use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// Who a lobby message is for
#[derive(Debug, Clone, PartialEq)]
pub enum Audience {
    All,
    /// Everyone except one connection
    AllExcept(Uuid),
    /// Every session of one identity
    Identity(String),
}

impl Audience {
    pub fn includes(&self, connection: Uuid, identity: &str) -> bool {
        match self {
            Audience::All => true,
            Audience::AllExcept(excluded) => *excluded != connection,
            Audience::Identity(target) => target == identity,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    Notification(Notification),
    PresenceDiff(PresenceDiff),
}

/// Message fanned out to every lobby connection, filtered on receipt
#[derive(Debug, Clone)]
pub struct LobbyMessage {
    pub audience: Audience,
    pub event: LobbyEvent,
}

/// A connection's membership in the lobby
#[derive(Debug)]
pub struct LobbyMembership {
    pub session: SessionMeta,
    pub state: PresenceState,
    pub rx: broadcast::Receiver<LobbyMessage>,
}

/// Server side of the notifications topic: canonical presence table plus
/// notice fan-out.
pub struct LobbyHub {
    presence: Mutex<PresenceTable>,
    lobby_tx: broadcast::Sender<LobbyMessage>,
}

impl LobbyHub {
    pub fn new(capacity: usize) -> Self {
        let (lobby_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            presence: Mutex::new(PresenceTable::new()),
            lobby_tx,
        }
    }

    /// Track a new session for `identity`.
    ///
    /// The returned state already includes the new session; the join diff is
    /// broadcast to everyone, the joiner included.
    pub fn join(&self, identity: &str) -> LobbyMembership {
        let mut table = self.table();
        let rx = self.lobby_tx.subscribe();

        let session = SessionMeta::new(
            Uuid::new_v4().simple().to_string(),
            identity,
            Utc::now().timestamp(),
        );
        let diff = table.track(session.clone());
        let state = table.state();
        self.send(Audience::All, LobbyEvent::PresenceDiff(diff));

        info!(
            identity = %identity,
            session_ref = %session.session_ref,
            sessions = table.session_count(),
            "Lobby join"
        );

        LobbyMembership { session, state, rx }
    }

    /// Untrack a session and broadcast the leave
    pub fn leave(&self, session: &SessionMeta) {
        let mut table = self.table();
        if let Some(diff) = table.untrack(&session.identity, &session.session_ref) {
            self.send(Audience::All, LobbyEvent::PresenceDiff(diff));
            info!(
                identity = %session.identity,
                session_ref = %session.session_ref,
                sessions = table.session_count(),
                "Lobby leave"
            );
        }
    }

    pub fn presence_state(&self) -> PresenceState {
        self.table().state()
    }

    /// Broadcast to everyone, sender included
    pub fn notify_all(&self, body: &str) -> Notification {
        self.notify(Audience::All, body)
    }

    /// Broadcast to everyone but the sending connection
    pub fn notify_others(&self, sender: Uuid, body: &str) -> Notification {
        self.notify(Audience::AllExcept(sender), body)
    }

    /// Deliver to every session of `recipient`. An identity with no
    /// sessions simply receives nothing.
    pub fn notify_direct(&self, recipient: &str, body: &str) -> Notification {
        self.notify(Audience::Identity(recipient.to_string()), body)
    }

    fn notify(&self, audience: Audience, body: &str) -> Notification {
        let notification = Notification::now(body);
        debug!(audience = ?audience, body = %body, "Lobby notification");
        self.send(audience, LobbyEvent::Notification(notification.clone()));
        notification
    }

    fn send(&self, audience: Audience, event: LobbyEvent) {
        // No subscribers is fine
        let _ = self.lobby_tx.send(LobbyMessage { audience, event });
    }

    fn table(&self) -> MutexGuard<'_, PresenceTable> {
        self.presence.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
