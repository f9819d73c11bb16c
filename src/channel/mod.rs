// Client side of the topic-multiplexed socket

mod socket;


pub use socket::{JoinState, Socket, Subscription};

use crate::protocol::{ClientEvent, ProtocolError};
use serde_json::Value;
use std::fmt;

/// Outbound seam for client → server pushes.
///
/// Pushes are fire-and-forget: an `Ok` means the frame was queued, not that
/// the server received it.
pub trait Pusher {
    fn push(&self, event: ClientEvent) -> Result<(), ChannelError>;
}

/// Channel errors
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelError {
    /// Socket or topic closed underneath the caller
    Closed,
    /// Server answered the join with `error`
    JoinRefused(Value),
    /// No join reply within the configured timeout
    JoinTimeout,
    /// Operation requires a live subscription
    NotJoined,
    /// Join requested on a live subscription
    AlreadyJoined,
    Protocol(ProtocolError),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Closed => write!(f, "channel closed"),
            ChannelError::JoinRefused(reason) => write!(f, "join refused: {}", reason),
            ChannelError::JoinTimeout => write!(f, "join timed out"),
            ChannelError::NotJoined => write!(f, "channel not joined"),
            ChannelError::AlreadyJoined => write!(f, "channel already joined"),
            ChannelError::Protocol(e) => write!(f, "protocol error: {}", e),
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<ProtocolError> for ChannelError {
    fn from(e: ProtocolError) -> Self {
        ChannelError::Protocol(e)
    }
}
