use anyhow::{Context, Result};
use rostersync::api::{create_roster_router, create_ws_router, RosterAppState, WsAppState};
use rostersync::config::RosterSyncConfig;
use rostersync::server::{AckLedger, LobbyHub, RosterEngine};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rostersync=info".into()),
        )
        .init();

    info!("Rostersync starting...");

    let config = RosterSyncConfig::from_env().context("Failed to load configuration")?;
    info!(
        bind_addr = %config.server.bind_addr,
        roster_topic = %config.topics.roster,
        lobby_topic = %config.topics.lobby,
        socket_token = config.server.socket_token.is_some(),
        "Configuration loaded"
    );

    let roster = Arc::new(RosterEngine::new(config.broadcast.roster_capacity));
    let lobby = Arc::new(LobbyHub::new(config.broadcast.lobby_capacity));
    let acks = Arc::new(AckLedger::new());

    let ws_state = Arc::new(WsAppState {
        roster: Arc::clone(&roster),
        lobby: Arc::clone(&lobby),
        acks: Arc::clone(&acks),
        topics: config.topics.clone(),
        socket_token: config.server.socket_token.clone(),
    });
    let rest_state = RosterAppState {
        roster: Arc::clone(&roster),
        lobby: Arc::clone(&lobby),
        acks: Arc::clone(&acks),
    };

    let app = create_ws_router(ws_state)
        .merge(create_roster_router(rest_state))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Rostersync listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("Rostersync stopped");

    Ok(())
}
