// Client sessions: a topic subscription paired with the state it feeds

use crate::channel::{ChannelError, Socket, Subscription};
use crate::entity::Roster;
use crate::lobby::{LobbyUpdate, LobbyView};
use crate::protocol::ServerEvent;
use crate::sync::{Applied, Reconciler, SyncError};
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};


/// Roster topic subscription with its reconciler.
///
/// Owns the subscription; dropping the session leaves the topic.
pub struct RosterSession {
    subscription: Subscription,
    reconciler: Reconciler,
}

impl RosterSession {
    /// Join `topic` on `socket`. Returns once the server accepted the join;
    /// the snapshot arrives through [`RosterSession::next`].
    pub async fn join(
        socket: &Socket,
        topic: &str,
        params: Value,
        max_pending: usize,
    ) -> Result<Self, SessionError> {
        let mut subscription = socket.channel(topic, params);
        let mut reconciler = Reconciler::with_max_pending(max_pending);

        reconciler.begin_join()?;
        match subscription.join().await {
            Ok(_) => reconciler.join_ok(),
            Err(ChannelError::JoinRefused(reason)) => {
                return Err(reconciler.join_refused(reason).into());
            }
            Err(e) => {
                reconciler.leave();
                return Err(e.into());
            }
        }

        Ok(Self {
            subscription,
            reconciler,
        })
    }

    /// Wait for the next roster envelope, reconcile it and acknowledge it.
    ///
    /// Returns `None` once the topic or socket closed.
    pub async fn next(&mut self) -> Option<Result<Applied, SyncError>> {
        loop {
            let event = match self.subscription.next_event().await {
                Some(event) => event,
                None => {
                    self.reconciler.leave();
                    return None;
                }
            };

            if matches!(event, ServerEvent::Close | ServerEvent::Error) {
                self.reconciler.leave();
                return None;
            }

            match event.into_sync_envelope() {
                Some(envelope) => {
                    return Some(self.reconciler.handle(envelope, &self.subscription));
                }
                None => debug!(topic = %self.subscription.topic(), "Ignoring non-roster event"),
            }
        }
    }

    /// Handle envelopes until the roster is hydrated
    pub async fn hydrated(&mut self) -> Result<&Roster, SessionError> {
        while !self.reconciler.is_hydrated() {
            match self.next().await {
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ChannelError::Closed.into()),
            }
        }
        Ok(self.reconciler.roster())
    }

    pub fn roster(&self) -> &Roster {
        self.reconciler.roster()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Unsubscribe; the last reconciled roster stays readable.
    ///
    /// Envelopes already queued are still reconciled and acknowledged by
    /// [`RosterSession::next`], which returns `None` once they are drained.
    pub fn leave(&mut self) {
        self.subscription.leave();
    }
}

/// Notifications topic subscription with its view.
pub struct LobbySession {
    subscription: Subscription,
    view: LobbyView,
}

impl LobbySession {
    pub async fn join(
        socket: &Socket,
        topic: &str,
        params: Value,
        feed_window: usize,
    ) -> Result<Self, SessionError> {
        let mut subscription = socket.channel(topic, params);
        let mut view = LobbyView::new(feed_window);

        view.joined();
        subscription.join().await?;

        Ok(Self { subscription, view })
    }

    /// Next lobby update, or `None` once the topic or socket closed
    pub async fn next(&mut self) -> Option<LobbyUpdate> {
        let event = self.subscription.next_event().await?;
        match self.view.handle(event) {
            LobbyUpdate::Closed => {
                warn!(topic = %self.subscription.topic(), "Lobby closed by server");
                None
            }
            update => Some(update),
        }
    }

    pub fn view(&self) -> &LobbyView {
        &self.view
    }

    pub fn notify_others(&self) -> Result<(), ChannelError> {
        self.view.notify_others(&self.subscription)
    }

    pub fn notify_all(&self) -> Result<(), ChannelError> {
        self.view.notify_all(&self.subscription)
    }

    pub fn notify_direct(&self, recipient: &str) -> Result<(), ChannelError> {
        self.view.notify_direct(&self.subscription, recipient)
    }

    pub fn leave(&mut self) {
        self.subscription.leave();
    }
}

/// Session errors
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    Channel(ChannelError),
    Sync(SyncError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Channel(e) => write!(f, "{}", e),
            SessionError::Sync(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ChannelError> for SessionError {
    fn from(e: ChannelError) -> Self {
        SessionError::Channel(e)
    }
}

impl From<SyncError> for SessionError {
    fn from(e: SyncError) -> Self {
        SessionError::Sync(e)
    }
}
