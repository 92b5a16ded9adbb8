//! Health check endpoint.

use super::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

/// GET /health - Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "backup_running": state.manager.is_job_running(),
        "scheduler_running": state.manager.is_scheduler_running(),
    }))
}
