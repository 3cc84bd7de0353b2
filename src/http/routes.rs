//! HTTP route definitions

use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    extract::{Extension, Query, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::error;
use uuid::Uuid;

use crate::app::AppState;
use crate::http::middleware::{require_auth, AuthenticatedUser};
use crate::store::{GameRecord, StoreError};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Upper bound for plain HTTP requests; WebSocket sessions are upgraded before it applies
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/game/records", get(game_records_handler))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    uptime_secs: u64,
    active_rooms: usize,
    connections: usize,
    queued: BTreeMap<String, usize>,
    pending_invites: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let queued = state
        .matchmaking
        .queue_sizes()
        .await
        .into_iter()
        .map(|(tier, waiting)| (tier.to_string(), waiting))
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: uptime_secs(),
        active_rooms: state.sessions.active_rooms(),
        connections: state.hub.connection_count(),
        queued,
        pending_invites: state.matchmaking.pending_invites(),
    })
}

// ============================================================================
// Game record endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
struct RecordsQuery {
    /// Whose records to list; defaults to the caller
    id: Option<Uuid>,
}

async fn game_records_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<Vec<GameRecord>>, AppError> {
    let user_id = query.id.unwrap_or(auth.user_id);
    let records = state.record_store.get_records(user_id).await?;
    Ok(Json(records))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::Store(e) => {
                error!(error = %e, "Record store request failed");
                (StatusCode::BAD_GATEWAY, "Game records unavailable".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
