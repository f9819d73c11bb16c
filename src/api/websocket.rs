use crate::api::connection::ConnectionManager;
use crate::config::TopicsConfig;
use crate::server::{AckLedger, LobbyHub, RosterEngine};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Query, Request, State,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Query parameters for WebSocket upgrade
#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
    user_name: Option<String>,
}

/// Shared application state for WebSocket handler
#[derive(Clone)]
pub struct WsAppState {
    pub roster: Arc<RosterEngine>,
    pub lobby: Arc<LobbyHub>,
    pub acks: Arc<AckLedger>,
    pub topics: TopicsConfig,
    /// `None` disables the token check
    pub socket_token: Option<String>,
}

/// Token middleware: validates ?token= when a socket token is configured.
///
/// Runs before WebSocket upgrade extraction so 401 is returned without a
/// valid upgrade request.
async fn ws_auth(
    State(state): State<Arc<WsAppState>>,
    Query(params): Query<WsQuery>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.socket_token {
        if params.token.as_deref() != Some(expected.as_str()) {
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    }
    next.run(req).await
}

/// GET /socket/websocket - WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsAppState>>,
    Query(params): Query<WsQuery>,
) -> Response {
    let identity = params
        .user_name
        .filter(|name| !name.is_empty())
        .unwrap_or_else(generate_user_name);
    info!(identity = %identity, "WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Create WebSocket router with token middleware applied
pub fn create_ws_router(state: Arc<WsAppState>) -> Router {
    Router::new()
        .route("/socket/websocket", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), ws_auth))
        .with_state(state)
}

async fn handle_socket(socket: WebSocket, state: Arc<WsAppState>, identity: String) {
    let manager = ConnectionManager::new(
        identity,
        state.topics.clone(),
        Arc::clone(&state.roster),
        Arc::clone(&state.lobby),
        Arc::clone(&state.acks),
    );

    manager.handle(socket).await;
}

/// `user_` plus six random alphanumerics
pub fn generate_user_name() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("user_{}", suffix.to_lowercase())
}
