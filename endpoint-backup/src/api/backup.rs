//! Backup control endpoints.

use super::{ApiError, AppState};
use crate::executor::JobSummary;
use crate::snapshot::{self, Snapshot};
use crate::utils::errors::BackupError;
use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
pub struct SnapshotsResponse {
    pub snapshots: Vec<Snapshot>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// POST /backup/run - Run a backup now and wait for it to finish
pub async fn run_backup(State(state): State<AppState>) -> Result<Json<JobSummary>, ApiError> {
    tracing::info!("Backup requested via API");
    let job = state.manager.run_backup().await?;
    Ok(Json(job.summary()))
}

/// GET /backup/snapshots - List stored snapshots, oldest first
pub async fn list_snapshots(State(state): State<AppState>) -> Result<Json<SnapshotsResponse>, ApiError> {
    let provider = state
        .manager
        .provider()
        .ok_or_else(|| BackupError::Config("backup provider is required".to_string()))?;

    let listing = tokio::task::spawn_blocking(move || snapshot::list_snapshots(provider.as_ref()))
        .await
        .map_err(|e| BackupError::Io(std::io::Error::other(format!("snapshot listing task failed: {}", e))))??;

    Ok(Json(SnapshotsResponse {
        count: listing.snapshots.len(),
        snapshots: listing.snapshots,
        warning: listing.errors.into_error().map(|e| e.to_string()),
    }))
}

/// POST /backup/stop - Stop the backup scheduler
pub async fn stop_backup(State(state): State<AppState>) -> Json<Value> {
    tracing::info!("Backup scheduler stop requested via API");
    state.manager.stop().await;
    Json(json!({ "stopped": true }))
}
