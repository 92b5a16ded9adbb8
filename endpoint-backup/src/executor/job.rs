//! Backup run records.

use crate::snapshot::manifest::new_job_id;
use crate::snapshot::Snapshot;
use crate::utils::errors::BackupError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one `run_backup` call.
///
/// `Failed` and `Skipped` always carry an error. A `Completed` job may carry one
/// too, describing problems that did not stop the snapshot (skipped paths,
/// failed uploads, pruning failures).
#[derive(Debug)]
pub struct BackupJob {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub snapshot: Option<Snapshot>,
    pub files_backed_up: usize,
    pub bytes_backed_up: u64,
    pub status: JobStatus,
    pub error: Option<BackupError>,
}

impl BackupJob {
    pub fn start() -> Self {
        Self::with_id(new_job_id(), Utc::now())
    }

    pub(crate) fn with_id(id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at,
            completed_at: None,
            snapshot: None,
            files_backed_up: 0,
            bytes_backed_up: 0,
            status: JobStatus::Running,
            error: None,
        }
    }

    pub(crate) fn finish(&mut self, status: JobStatus, error: Option<BackupError>) {
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.id.clone(),
            status: self.status,
            started_at: self.started_at,
            completed_at: self.completed_at,
            snapshot_id: self.snapshot.as_ref().map(|s| s.id.clone()),
            files_backed_up: self.files_backed_up,
            bytes_backed_up: self.bytes_backed_up,
            warning: self.error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Serializable view of a job, as reported to the control API.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    pub files_backed_up: usize,
    pub bytes_backed_up: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}
