//! HTTP control API for the endpoint backup agent.

pub mod backup;
pub mod health;

use crate::executor::BackupManager;
use crate::utils::errors::BackupError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<BackupManager>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(manager: Arc<BackupManager>) -> Self {
        Self {
            manager,
            started_at: Instant::now(),
        }
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/backup/run", post(backup::run_backup))
        .route("/backup/snapshots", get(backup::list_snapshots))
        .route("/backup/stop", post(backup::stop_backup))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A [`BackupError`] rendered as a JSON error body.
#[derive(Debug)]
pub struct ApiError(pub BackupError);

impl From<BackupError> for ApiError {
    fn from(err: BackupError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BackupError::AlreadyRunning | BackupError::AlreadyStarted => StatusCode::CONFLICT,
            BackupError::Config(_) => StatusCode::BAD_REQUEST,
            BackupError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
