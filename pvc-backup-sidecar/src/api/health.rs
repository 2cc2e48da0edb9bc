//! Health, version and plugin identity endpoints.

use super::AppState;
use crate::metadata::CAPABILITIES;
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

/// GET /health - Readiness probe
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "active_backups": state.backup.locks().len(),
        "shutting_down": state.shutdown.is_cancelled(),
    }))
}

/// GET /version - Version information endpoint
pub async fn version() -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "build": if cfg!(debug_assertions) { "debug" } else { "release" },
    }))
}

/// GET /identity - Plugin metadata and implemented services
pub async fn identity(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "metadata": state.metadata.as_ref(),
        "capabilities": CAPABILITIES,
    }))
}
