// Wire protocol: socket frames and the typed events carried inside them

mod events;

#[cfg(test)]
mod tests;

pub use events::{
    AckPayload, ClientEvent, DirectPayload, HydratePayload, MutationPayload, NotifyPayload,
    Operation, ReplyPayload, ReplyStatus, ServerEvent, SyncEnvelope, UserInfo, ACK_RECEIVED,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Client → Server: subscribe to a topic
pub const PHX_JOIN: &str = "phx_join";
/// Client → Server: unsubscribe from a topic
pub const PHX_LEAVE: &str = "phx_leave";
/// Server → Client: reply to a request carrying a `ref`
pub const PHX_REPLY: &str = "phx_reply";
/// Server → Client: topic closed
pub const PHX_CLOSE: &str = "phx_close";
/// Server → Client: topic crashed
pub const PHX_ERROR: &str = "phx_error";
/// Client → Server: keepalive on [`SOCKET_TOPIC`]
pub const HEARTBEAT: &str = "heartbeat";
/// Reserved topic for socket-level traffic
pub const SOCKET_TOPIC: &str = "phoenix";

/// One message on the socket, scoped to a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default)]
    pub join_ref: Option<String>,
}

impl Frame {
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload,
            msg_ref: None,
            join_ref: None,
        }
    }

    pub fn with_ref(mut self, msg_ref: impl Into<String>) -> Self {
        self.msg_ref = Some(msg_ref.into());
        self
    }

    pub fn with_join_ref(mut self, join_ref: Option<String>) -> Self {
        self.join_ref = join_ref;
        self
    }

    /// Reply to the request `request`, echoing its refs
    pub fn reply(
        request: &Frame,
        status: ReplyStatus,
        response: Value,
    ) -> Result<Self, ProtocolError> {
        let payload = encode_payload(PHX_REPLY, &ReplyPayload { status, response })?;
        Ok(Self {
            topic: request.topic.clone(),
            event: PHX_REPLY.to_string(),
            payload,
            msg_ref: request.msg_ref.clone(),
            join_ref: request.join_ref.clone(),
        })
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// Protocol decoding errors
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Text is not a frame
    Malformed(String),
    /// Event name not part of the protocol
    UnknownEvent(String),
    /// Event known but payload has the wrong shape
    InvalidPayload { event: String, reason: String },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Malformed(msg) => write!(f, "malformed frame: {}", msg),
            ProtocolError::UnknownEvent(event) => write!(f, "unknown event '{}'", event),
            ProtocolError::InvalidPayload { event, reason } => {
                write!(f, "invalid payload for '{}': {}", event, reason)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

pub(crate) fn decode_payload<T: DeserializeOwned>(
    event: &str,
    payload: Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|e| ProtocolError::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn encode_payload<T: Serialize>(event: &str, payload: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(payload).map_err(|e| ProtocolError::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}
