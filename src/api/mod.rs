// HTTP and WebSocket APIs

mod connection;
pub mod roster;
pub mod websocket;

pub use connection::ConnectionManager;
pub use roster::{create_roster_router, MutationResponse, RosterApiError, RosterAppState};
pub use websocket::{create_ws_router, generate_user_name, ws_handler, WsAppState};
