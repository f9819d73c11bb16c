// Server-of-record side: roster broadcaster, lobby fan-out, ack bookkeeping

mod acks;
mod lobby;
mod roster;


pub use acks::AckLedger;
pub use lobby::{Audience, LobbyEvent, LobbyHub, LobbyMembership, LobbyMessage};
pub use roster::{new_message_id, RosterEngine, RosterError};
