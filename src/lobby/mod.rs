use crate::channel::{ChannelError, Pusher};
use crate::notification::{Notification, NotificationFeed};
use crate::presence::{PresenceMap, PresenceRow, PresenceTracker};
use crate::protocol::{ClientEvent, DirectPayload, NotifyPayload, ServerEvent};
use tracing::{debug, info};

#[cfg(test)]
mod tests;

/// What a lobby event changed.
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyUpdate {
    /// Server told us who we are
    Identity(String),
    /// Presence recomputed
    Presence(PresenceMap),
    /// Presence diff held until the full state arrives
    PresencePending,
    Notification(Notification),
    /// Server closed the topic
    Closed,
    /// Event not meant for the lobby
    Ignored,
}

/// Client view of the notifications topic: own identity, who is online,
/// and the recent notice feed.
#[derive(Debug)]
pub struct LobbyView {
    user_name: Option<String>,
    presence: PresenceTracker,
    feed: NotificationFeed,
}

impl LobbyView {
    pub fn new(feed_window: usize) -> Self {
        Self {
            user_name: None,
            presence: PresenceTracker::new(),
            feed: NotificationFeed::new(feed_window),
        }
    }

    /// A new join starts; presence must be re-synced from a full state.
    pub fn joined(&mut self) {
        self.presence.reset();
    }

    pub fn handle(&mut self, event: ServerEvent) -> LobbyUpdate {
        match event {
            ServerEvent::UserInfo(info) => {
                info!(user_name = %info.user_name, "Identity assigned");
                self.user_name = Some(info.user_name.clone());
                LobbyUpdate::Identity(info.user_name)
            }
            ServerEvent::PresenceState(state) => {
                LobbyUpdate::Presence(self.presence.sync_state(state))
            }
            ServerEvent::PresenceDiff(diff) => match self.presence.sync_diff(diff) {
                Some(map) => LobbyUpdate::Presence(map),
                None => LobbyUpdate::PresencePending,
            },
            ServerEvent::Notification(notification) => {
                self.feed.push(notification.clone());
                LobbyUpdate::Notification(notification)
            }
            ServerEvent::Close | ServerEvent::Error => LobbyUpdate::Closed,
            other => {
                debug!(event = other.event_name(), "Ignoring event on lobby topic");
                LobbyUpdate::Ignored
            }
        }
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn presence(&self) -> PresenceMap {
        self.presence.list()
    }

    /// One row per session; rows of our own identity are tagged
    pub fn rows(&self) -> Vec<PresenceRow> {
        self.presence.rows(self.user_name().unwrap_or_default())
    }

    pub fn feed(&self) -> &NotificationFeed {
        &self.feed
    }

    /// Ask the server to notify everyone but us
    pub fn notify_others<P>(&self, pusher: &P) -> Result<(), ChannelError>
    where
        P: Pusher + ?Sized,
    {
        pusher.push(ClientEvent::NotifyOthers(NotifyPayload {
            body: self.broadcast_body(),
        }))
    }

    /// Ask the server to notify everyone, us included
    pub fn notify_all<P>(&self, pusher: &P) -> Result<(), ChannelError>
    where
        P: Pusher + ?Sized,
    {
        pusher.push(ClientEvent::NotifyAll(NotifyPayload {
            body: self.broadcast_body(),
        }))
    }

    /// Ask the server to notify one identity. Whether it exists is the
    /// server's concern.
    pub fn notify_direct<P>(&self, pusher: &P, recipient: &str) -> Result<(), ChannelError>
    where
        P: Pusher + ?Sized,
    {
        pusher.push(ClientEvent::NotifyDirect(DirectPayload {
            body: format!(
                "Message to {} from {}",
                recipient,
                self.user_name().unwrap_or_default()
            ),
            recipient: recipient.to_string(),
        }))
    }

    fn broadcast_body(&self) -> String {
        format!("Message from {}", self.user_name().unwrap_or_default())
    }
}
