use super::{
    decode_payload, encode_payload, Frame, ProtocolError, PHX_CLOSE, PHX_ERROR, PHX_REPLY,
};
use crate::entity::Superhero;
use crate::notification::Notification;
use crate::presence::{PresenceDiff, PresenceState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status carried by every acknowledgment
pub const ACK_RECEIVED: &str = "Received";

/// Server → Client: full roster, sent once per successful join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydratePayload {
    #[serde(alias = "superheroes")]
    pub entities: Vec<Superhero>,
    pub message_id: String,
}

/// Server → Client: one create, update or delete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationPayload {
    pub superhero: Superhero,
    pub message_id: String,
}

/// Client → Server: receipt for a hydrate or mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckPayload {
    pub message_id: String,
    pub status: String,
}

impl AckPayload {
    pub fn received(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            status: ACK_RECEIVED.to_string(),
        }
    }
}

/// Client → Server: broadcast request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyPayload {
    pub body: String,
}

/// Client → Server: push addressed to one identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectPayload {
    pub body: String,
    pub recipient: String,
}

/// Server → Client: the identity the server assigned to this socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// Payload of `phx_reply`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub status: ReplyStatus,
    #[serde(default)]
    pub response: Value,
}

/// Mutation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn event_name(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// The part of the server stream the roster reconciler consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEnvelope {
    Snapshot(HydratePayload),
    Mutation {
        operation: Operation,
        payload: MutationPayload,
    },
}

impl SyncEnvelope {
    pub fn message_id(&self) -> &str {
        match self {
            SyncEnvelope::Snapshot(payload) => &payload.message_id,
            SyncEnvelope::Mutation { payload, .. } => &payload.message_id,
        }
    }

    pub fn into_server_event(self) -> ServerEvent {
        match self {
            SyncEnvelope::Snapshot(payload) => ServerEvent::Hydrate(payload),
            SyncEnvelope::Mutation { operation, payload } => match operation {
                Operation::Create => ServerEvent::Create(payload),
                Operation::Update => ServerEvent::Update(payload),
                Operation::Delete => ServerEvent::Delete(payload),
            },
        }
    }
}

/// Server → Client events.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Hydrate(HydratePayload),
    Create(MutationPayload),
    Update(MutationPayload),
    Delete(MutationPayload),
    Notification(Notification),
    UserInfo(UserInfo),
    PresenceState(PresenceState),
    PresenceDiff(PresenceDiff),
    Reply(ReplyPayload),
    Close,
    Error,
}

impl ServerEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerEvent::Hydrate(_) => "hydrate",
            ServerEvent::Create(_) => "create",
            ServerEvent::Update(_) => "update",
            ServerEvent::Delete(_) => "delete",
            ServerEvent::Notification(_) => "notification",
            ServerEvent::UserInfo(_) => "user_info",
            ServerEvent::PresenceState(_) => "presence_state",
            ServerEvent::PresenceDiff(_) => "presence_diff",
            ServerEvent::Reply(_) => PHX_REPLY,
            ServerEvent::Close => PHX_CLOSE,
            ServerEvent::Error => PHX_ERROR,
        }
    }

    pub fn from_frame(frame: Frame) -> Result<Self, ProtocolError> {
        let event = frame.event.as_str();
        let payload = frame.payload;

        let decoded = match event {
            "hydrate" => ServerEvent::Hydrate(decode_payload(event, payload)?),
            "create" => ServerEvent::Create(decode_payload(event, payload)?),
            "update" => ServerEvent::Update(decode_payload(event, payload)?),
            "delete" => ServerEvent::Delete(decode_payload(event, payload)?),
            "notification" => ServerEvent::Notification(decode_payload(event, payload)?),
            "user_info" => ServerEvent::UserInfo(decode_payload(event, payload)?),
            "presence_state" => ServerEvent::PresenceState(decode_payload(event, payload)?),
            "presence_diff" => ServerEvent::PresenceDiff(decode_payload(event, payload)?),
            PHX_REPLY => ServerEvent::Reply(decode_payload(event, payload)?),
            PHX_CLOSE => ServerEvent::Close,
            PHX_ERROR => ServerEvent::Error,
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        };

        Ok(decoded)
    }

    pub fn to_frame(&self, topic: &str) -> Result<Frame, ProtocolError> {
        let event = self.event_name();
        let payload = match self {
            ServerEvent::Hydrate(p) => encode_payload(event, p)?,
            ServerEvent::Create(p) | ServerEvent::Update(p) | ServerEvent::Delete(p) => {
                encode_payload(event, p)?
            }
            ServerEvent::Notification(p) => encode_payload(event, p)?,
            ServerEvent::UserInfo(p) => encode_payload(event, p)?,
            ServerEvent::PresenceState(p) => encode_payload(event, p)?,
            ServerEvent::PresenceDiff(p) => encode_payload(event, p)?,
            ServerEvent::Reply(p) => encode_payload(event, p)?,
            ServerEvent::Close | ServerEvent::Error => Value::Object(Default::default()),
        };

        Ok(Frame::new(topic, event, payload))
    }

    /// Split out the roster stream; other events return `None`.
    pub fn into_sync_envelope(self) -> Option<SyncEnvelope> {
        match self {
            ServerEvent::Hydrate(payload) => Some(SyncEnvelope::Snapshot(payload)),
            ServerEvent::Create(payload) => Some(SyncEnvelope::Mutation {
                operation: Operation::Create,
                payload,
            }),
            ServerEvent::Update(payload) => Some(SyncEnvelope::Mutation {
                operation: Operation::Update,
                payload,
            }),
            ServerEvent::Delete(payload) => Some(SyncEnvelope::Mutation {
                operation: Operation::Delete,
                payload,
            }),
            _ => None,
        }
    }
}

/// Client → Server events.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    MessageAck(AckPayload),
    NotifyOthers(NotifyPayload),
    NotifyAll(NotifyPayload),
    NotifyDirect(DirectPayload),
}

impl ClientEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientEvent::MessageAck(_) => "message_ack",
            ClientEvent::NotifyOthers(_) => "notify_others",
            ClientEvent::NotifyAll(_) => "notify_all",
            ClientEvent::NotifyDirect(_) => "notify_direct",
        }
    }

    pub fn from_frame(frame: Frame) -> Result<Self, ProtocolError> {
        let event = frame.event.as_str();
        let payload = frame.payload;

        let decoded = match event {
            "message_ack" => ClientEvent::MessageAck(decode_payload(event, payload)?),
            "notify_others" => ClientEvent::NotifyOthers(decode_payload(event, payload)?),
            "notify_all" => ClientEvent::NotifyAll(decode_payload(event, payload)?),
            "notify_direct" => ClientEvent::NotifyDirect(decode_payload(event, payload)?),
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        };

        Ok(decoded)
    }

    pub fn to_frame(&self, topic: &str) -> Result<Frame, ProtocolError> {
        let event = self.event_name();
        let payload = match self {
            ClientEvent::MessageAck(p) => encode_payload(event, p)?,
            ClientEvent::NotifyOthers(p) | ClientEvent::NotifyAll(p) => encode_payload(event, p)?,
            ClientEvent::NotifyDirect(p) => encode_payload(event, p)?,
        };

        Ok(Frame::new(topic, event, payload))
    }
}
