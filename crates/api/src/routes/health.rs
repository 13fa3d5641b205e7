use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct WelcomeResponse {
    pub message: String,
}

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Jobs currently tracked by the store.
    pub jobs: usize,
    pub queue: QueueStats,
}

#[derive(Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
    pub max_concurrent: usize,
}

/// GET / -- welcome message.
async fn root(State(state): State<AppState>) -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: format!("Welcome to {} with Manim!", state.config.app_title),
    })
}

/// GET /health -- service status and worker queue load.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.backend.stats();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        jobs: state.store.len().await,
        queue: QueueStats {
            queued: stats.queued,
            running: stats.running,
            max_concurrent: stats.max_concurrent,
        },
    })
}

/// Mount root-level routes (NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
}
