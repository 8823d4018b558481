//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::battle::GameWorld;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let cors = match state.config.client_origin.as_deref() {
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE])
        }
        None => CorsLayer::permissive(),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/battles", get(list_battles_handler))
        .route(
            "/battles/:battle_id",
            post(create_battle_handler).delete(remove_battle_handler),
        )
        .route("/battles/:battle_id/connect", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_worlds: usize,
    connected_clients: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_worlds: state.worlds.len(),
        connected_clients: state.worlds.connected_clients(),
    })
}

// ============================================================================
// Battle management endpoints
// ============================================================================

#[derive(Debug, Serialize)]
struct BattleInfo {
    battle_id: Uuid,
    clients: usize,
    idle_secs: i64,
}

impl BattleInfo {
    fn of(world: &GameWorld) -> Self {
        Self {
            battle_id: world.battle_id(),
            clients: world.client_count(),
            idle_secs: (Utc::now() - world.last_activity()).num_seconds().max(0),
        }
    }
}

async fn list_battles_handler(State(state): State<AppState>) -> Json<Vec<BattleInfo>> {
    let battles = state
        .worlds
        .worlds()
        .iter()
        .map(|w| BattleInfo::of(w))
        .collect();
    Json(battles)
}

async fn create_battle_handler(
    State(state): State<AppState>,
    Path(battle_id): Path<Uuid>,
) -> Json<BattleInfo> {
    let world = state.worlds.get_or_create(battle_id);
    Json(BattleInfo::of(&world))
}

async fn remove_battle_handler(
    State(state): State<AppState>,
    Path(battle_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .worlds
        .remove(battle_id)
        .ok_or_else(|| AppError::NotFound(format!("battle {battle_id}")))?;

    info!(battle_id = %battle_id, "Battle removed via API");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}
