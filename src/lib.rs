// Entity model: superheroes and the ordered roster
pub mod entity;

// Wire frames and typed topic events
pub mod protocol;

// Client-side roster reconciliation
pub mod sync;

// Presence mirroring (client) and canonical table (server)
pub mod presence;

// Bounded notification feed
pub mod notification;

// Client-side view of the notifications topic
pub mod lobby;

// Client socket and topic subscriptions
pub mod channel;

// Client sessions pairing a subscription with its state
pub mod client;

// Server-of-record: roster broadcaster, lobby hub, ack ledger
pub mod server;

// HTTP and WebSocket APIs
pub mod api;

// Configuration loading
pub mod config;
