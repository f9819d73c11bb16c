use crate::config::TopicsConfig;
use crate::presence::SessionMeta;
use crate::protocol::{
    ClientEvent, Frame, ProtocolError, ReplyStatus, ServerEvent, SyncEnvelope, UserInfo,
    HEARTBEAT, PHX_JOIN, PHX_LEAVE, SOCKET_TOPIC,
};
use crate::server::{AckLedger, LobbyEvent, LobbyHub, LobbyMessage, RosterEngine};
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Live join on the roster topic
struct RosterJoin {
    join_ref: Option<String>,
    rx: broadcast::Receiver<SyncEnvelope>,
}

/// Live join on the lobby topic
struct LobbyJoin {
    join_ref: Option<String>,
    session: SessionMeta,
    rx: broadcast::Receiver<LobbyMessage>,
}

/// Drives one WebSocket: per-topic joins, roster and lobby fan-out, acks.
pub struct ConnectionManager {
    id: Uuid,
    /// Identity from the socket params; a lobby join may override it
    identity: String,
    topics: TopicsConfig,
    roster: Arc<RosterEngine>,
    lobby: Arc<LobbyHub>,
    acks: Arc<AckLedger>,
    roster_join: Option<RosterJoin>,
    lobby_join: Option<LobbyJoin>,
}

impl ConnectionManager {
    pub fn new(
        identity: String,
        topics: TopicsConfig,
        roster: Arc<RosterEngine>,
        lobby: Arc<LobbyHub>,
        acks: Arc<AckLedger>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            topics,
            roster,
            lobby,
            acks,
            roster_join: None,
            lobby_join: None,
        }
    }

    /// Handle WebSocket connection lifecycle
    pub async fn handle(mut self, mut socket: WebSocket) {
        info!(connection = %self.id, identity = %self.identity, "WebSocket connection established");

        loop {
            tokio::select! {
                msg = socket.recv() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_client_frame(&mut socket, &text).await {
                                error!(connection = %self.id, error = %e, "Error handling client frame");
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!(connection = %self.id, "WebSocket client disconnected");
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = socket.send(Message::Pong(data)).await {
                                error!(error = %e, "Failed to send pong");
                                break;
                            }
                        }
                        Some(Ok(_)) => {
                            // Binary and pong unused
                        }
                        Some(Err(e)) => {
                            warn!(connection = %self.id, error = %e, "WebSocket error");
                            break;
                        }
                    }
                }

                result = recv_from(self.roster_join.as_mut().map(|join| &mut join.rx)) => {
                    if let Err(e) = self.forward_roster(&mut socket, result).await {
                        error!(connection = %self.id, error = %e, "Failed to send roster event");
                        break;
                    }
                }

                result = recv_from(self.lobby_join.as_mut().map(|join| &mut join.rx)) => {
                    if let Err(e) = self.forward_lobby(&mut socket, result).await {
                        error!(connection = %self.id, error = %e, "Failed to send lobby event");
                        break;
                    }
                }
            }
        }

        self.teardown();
    }

    async fn handle_client_frame(&mut self, socket: &mut WebSocket, text: &str) -> Result<()> {
        let frame = match Frame::from_json(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(connection = %self.id, error = %e, "Ignoring malformed frame");
                return Ok(());
            }
        };

        if frame.topic == SOCKET_TOPIC {
            if frame.event == HEARTBEAT {
                send(socket, Frame::reply(&frame, ReplyStatus::Ok, json!({}))?).await?;
            }
            return Ok(());
        }

        match frame.event.as_str() {
            PHX_JOIN => self.join(socket, frame).await,
            PHX_LEAVE => self.leave(socket, frame).await,
            _ => self.handle_push(socket, frame).await,
        }
    }

    async fn join(&mut self, socket: &mut WebSocket, frame: Frame) -> Result<()> {
        if frame.topic == self.topics.roster {
            self.join_roster(socket, frame).await
        } else if frame.topic == self.topics.lobby {
            self.join_lobby(socket, frame).await
        } else {
            warn!(connection = %self.id, topic = %frame.topic, "Join to unknown topic");
            send(socket, unmatched(&frame)?).await
        }
    }

    async fn join_roster(&mut self, socket: &mut WebSocket, frame: Frame) -> Result<()> {
        let (snapshot, rx) = self.roster.snapshot_and_subscribe();
        self.roster_join = Some(RosterJoin {
            join_ref: frame.join_ref.clone(),
            rx,
        });

        send(socket, Frame::reply(&frame, ReplyStatus::Ok, json!({}))?).await?;

        info!(
            connection = %self.id,
            topic = %frame.topic,
            entities = snapshot.entities.len(),
            "Roster joined, sending snapshot"
        );
        self.send_snapshot(socket, SyncEnvelope::Snapshot(snapshot)).await
    }

    async fn join_lobby(&mut self, socket: &mut WebSocket, frame: Frame) -> Result<()> {
        // A repeated join replaces the earlier session
        if let Some(previous) = self.lobby_join.take() {
            self.lobby.leave(&previous.session);
        }

        let identity = frame
            .payload
            .get("user_name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.identity.clone());

        let membership = self.lobby.join(&identity);
        let join_ref = frame.join_ref.clone();
        self.lobby_join = Some(LobbyJoin {
            join_ref: join_ref.clone(),
            session: membership.session,
            rx: membership.rx,
        });

        send(socket, Frame::reply(&frame, ReplyStatus::Ok, json!({}))?).await?;
        send_event(
            socket,
            &frame.topic,
            &ServerEvent::PresenceState(membership.state),
            join_ref.clone(),
        )
        .await?;
        send_event(
            socket,
            &frame.topic,
            &ServerEvent::UserInfo(UserInfo {
                user_name: identity,
            }),
            join_ref,
        )
        .await
    }

    async fn leave(&mut self, socket: &mut WebSocket, frame: Frame) -> Result<()> {
        if frame.topic == self.topics.roster && self.roster_join.take().is_some() {
            info!(connection = %self.id, topic = %frame.topic, "Roster left");
        } else if frame.topic == self.topics.lobby {
            if let Some(join) = self.lobby_join.take() {
                self.lobby.leave(&join.session);
            }
        } else {
            return send(socket, unmatched(&frame)?).await;
        }

        send(socket, Frame::reply(&frame, ReplyStatus::Ok, json!({}))?).await
    }

    async fn handle_push(&mut self, socket: &mut WebSocket, frame: Frame) -> Result<()> {
        let roster_joined = frame.topic == self.topics.roster && self.roster_join.is_some();
        let lobby_joined = frame.topic == self.topics.lobby && self.lobby_join.is_some();
        if !roster_joined && !lobby_joined {
            debug!(connection = %self.id, topic = %frame.topic, event = %frame.event, "Push to unjoined topic");
            return send(socket, unmatched(&frame)?).await;
        }

        let event = match ClientEvent::from_frame(frame.clone()) {
            Ok(event) => event,
            Err(e) => {
                warn!(connection = %self.id, error = %e, "Rejecting client push");
                let reason = json!({ "reason": e.to_string() });
                let reply = Frame::reply(&frame, ReplyStatus::Error, reason)?;
                return send(socket, reply).await;
            }
        };

        match event {
            ClientEvent::MessageAck(ack) => {
                self.acks.acknowledge(self.id, &ack.message_id);
            }
            ClientEvent::NotifyOthers(notify) if lobby_joined => {
                self.lobby.notify_others(self.id, &notify.body);
            }
            ClientEvent::NotifyAll(notify) if lobby_joined => {
                self.lobby.notify_all(&notify.body);
            }
            ClientEvent::NotifyDirect(direct) if lobby_joined => {
                self.lobby.notify_direct(&direct.recipient, &direct.body);
            }
            other => {
                debug!(
                    connection = %self.id,
                    topic = %frame.topic,
                    event = other.event_name(),
                    "Notification push outside the lobby topic"
                );
            }
        }

        Ok(())
    }

    async fn forward_roster(
        &mut self,
        socket: &mut WebSocket,
        result: Result<SyncEnvelope, RecvError>,
    ) -> Result<()> {
        match result {
            Ok(envelope) => {
                self.acks.expect(self.id, envelope.message_id());
                send_event(socket, &self.topics.roster, &envelope.into_server_event(), None).await
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(connection = %self.id, skipped = skipped, "Roster stream lagged, re-hydrating");
                let (snapshot, rx) = self.roster.snapshot_and_subscribe();
                if let Some(join) = self.roster_join.as_mut() {
                    join.rx = rx;
                }
                self.send_snapshot(socket, SyncEnvelope::Snapshot(snapshot)).await
            }
            Err(RecvError::Closed) => {
                error!("Roster broadcast channel closed");
                self.roster_join = None;
                Ok(())
            }
        }
    }

    async fn forward_lobby(
        &mut self,
        socket: &mut WebSocket,
        result: Result<LobbyMessage, RecvError>,
    ) -> Result<()> {
        let Some(join) = self.lobby_join.as_ref() else {
            return Ok(());
        };

        match result {
            Ok(message) => {
                if !message.audience.includes(self.id, &join.session.identity) {
                    return Ok(());
                }
                let event = match message.event {
                    LobbyEvent::Notification(notification) => ServerEvent::Notification(notification),
                    LobbyEvent::PresenceDiff(diff) => ServerEvent::PresenceDiff(diff),
                };
                send_event(socket, &self.topics.lobby, &event, None).await
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(connection = %self.id, skipped = skipped, "Lobby stream lagged, resending presence");
                let state = ServerEvent::PresenceState(self.lobby.presence_state());
                send_event(socket, &self.topics.lobby, &state, join.join_ref.clone()).await
            }
            Err(RecvError::Closed) => {
                error!("Lobby broadcast channel closed");
                self.lobby_join = None;
                Ok(())
            }
        }
    }

    async fn send_snapshot(&self, socket: &mut WebSocket, envelope: SyncEnvelope) -> Result<()> {
        let join_ref = self.roster_join.as_ref().and_then(|join| join.join_ref.clone());
        self.acks.expect(self.id, envelope.message_id());
        send_event(socket, &self.topics.roster, &envelope.into_server_event(), join_ref).await
    }

    fn teardown(self) {
        if let Some(join) = &self.lobby_join {
            self.lobby.leave(&join.session);
        }
        self.acks.forget(self.id);
        info!(connection = %self.id, "WebSocket connection closed");
    }
}

/// Receive from an optional broadcast; pending forever when absent
async fn recv_from<T: Clone>(rx: Option<&mut broadcast::Receiver<T>>) -> Result<T, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn unmatched(request: &Frame) -> Result<Frame, ProtocolError> {
    Frame::reply(request, ReplyStatus::Error, json!({ "reason": "unmatched topic" }))
}

async fn send_event(
    socket: &mut WebSocket,
    topic: &str,
    event: &ServerEvent,
    join_ref: Option<String>,
) -> Result<()> {
    let frame = event.to_frame(topic)?.with_join_ref(join_ref);
    send(socket, frame).await
}

async fn send(socket: &mut WebSocket, frame: Frame) -> Result<()> {
    socket.send(Message::Text(frame.to_json()?)).await?;
    Ok(())
}
