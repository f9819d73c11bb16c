use crate::entity::{EntityId, Superhero};
use crate::notification::Notification;
use crate::protocol::{NotifyPayload, SyncEnvelope};
use crate::server::{AckLedger, LobbyHub, RosterEngine, RosterError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Shared state for the roster REST API
#[derive(Clone)]
pub struct RosterAppState {
    pub roster: Arc<RosterEngine>,
    pub lobby: Arc<LobbyHub>,
    pub acks: Arc<AckLedger>,
}

/// Response for create / update / delete
#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub superhero: Superhero,
    pub message_id: String,
}

impl MutationResponse {
    fn from_envelope(envelope: SyncEnvelope) -> Result<Self, RosterApiError> {
        match envelope {
            SyncEnvelope::Mutation { payload, .. } => Ok(Self {
                superhero: payload.superhero,
                message_id: payload.message_id,
            }),
            SyncEnvelope::Snapshot(_) => Err(RosterApiError::Internal(
                "mutation produced a snapshot".to_string(),
            )),
        }
    }
}

/// GET /api/superheroes - Current roster in order
async fn list_superheroes(State(state): State<Arc<RosterAppState>>) -> Json<Vec<Superhero>> {
    Json(state.roster.list())
}

/// POST /api/superheroes - Create; the id is assigned when the body has none
async fn create_superhero(
    State(state): State<Arc<RosterAppState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<MutationResponse>), RosterApiError> {
    let envelope = if body.get("id").is_some() {
        let hero = parse_superhero(body)?;
        state.roster.create(hero)?
    } else {
        let hero = parse_superhero(with_id(body, &EntityId::Int(0))?)?;
        state.roster.create_next(hero)?
    };

    let response = MutationResponse::from_envelope(envelope)?;
    info!(id = %response.superhero.id, "Superhero created");
    Ok((StatusCode::CREATED, Json(response)))
}

/// PUT /api/superheroes/:id - Replace; the path id wins over any body id
async fn update_superhero(
    State(state): State<Arc<RosterAppState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<MutationResponse>, RosterApiError> {
    let id = EntityId::parse(&id);
    let hero = parse_superhero(with_id(body, &id)?)?;
    let envelope = state.roster.update(hero)?;
    Ok(Json(MutationResponse::from_envelope(envelope)?))
}

/// DELETE /api/superheroes/:id
async fn delete_superhero(
    State(state): State<Arc<RosterAppState>>,
    Path(id): Path<String>,
) -> Result<Json<MutationResponse>, RosterApiError> {
    let envelope = state.roster.delete(&EntityId::parse(&id))?;
    Ok(Json(MutationResponse::from_envelope(envelope)?))
}

/// POST /api/notifications - Server-originated notice to every lobby member
async fn post_notification(
    State(state): State<Arc<RosterAppState>>,
    Json(payload): Json<NotifyPayload>,
) -> Result<(StatusCode, Json<Notification>), RosterApiError> {
    if payload.body.trim().is_empty() {
        return Err(RosterApiError::InvalidBody("body must not be empty".to_string()));
    }
    let notification = state.lobby.notify_all(&payload.body);
    Ok((StatusCode::ACCEPTED, Json(notification)))
}

/// GET /health
async fn health(State(state): State<Arc<RosterAppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "superheroes": state.roster.len(),
        "roster_subscribers": state.roster.subscriber_count(),
        "lobby_identities": state.lobby.presence_state().len(),
        "acknowledged_total": state.acks.acknowledged_total(),
    }))
}

fn with_id(body: Value, id: &EntityId) -> Result<Value, RosterApiError> {
    let Value::Object(mut fields) = body else {
        return Err(RosterApiError::InvalidBody("expected a JSON object".to_string()));
    };
    let id = serde_json::to_value(id).map_err(|e| RosterApiError::Internal(e.to_string()))?;
    fields.insert("id".to_string(), id);
    Ok(Value::Object(fields))
}

fn parse_superhero(body: Value) -> Result<Superhero, RosterApiError> {
    serde_json::from_value(body).map_err(|e| RosterApiError::InvalidBody(e.to_string()))
}

/// Create roster REST router
pub fn create_roster_router(state: RosterAppState) -> Router {
    Router::new()
        .route("/api/superheroes", get(list_superheroes).post(create_superhero))
        .route(
            "/api/superheroes/:id",
            put(update_superhero).delete(delete_superhero),
        )
        .route("/api/notifications", post(post_notification))
        .route("/health", get(health))
        .with_state(Arc::new(state))
}

/// Roster API errors
#[derive(Debug)]
pub enum RosterApiError {
    NotFound(String),
    Conflict(String),
    InvalidBody(String),
    Internal(String),
}

impl From<RosterError> for RosterApiError {
    fn from(err: RosterError) -> Self {
        match err {
            RosterError::NotFound(_) => RosterApiError::NotFound(err.to_string()),
            RosterError::AlreadyExists(_) | RosterError::IdSpaceExhausted => {
                RosterApiError::Conflict(err.to_string())
            }
        }
    }
}

impl IntoResponse for RosterApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            RosterApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            RosterApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            RosterApiError::InvalidBody(msg) => (StatusCode::BAD_REQUEST, msg),
            RosterApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
