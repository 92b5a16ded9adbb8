//! Backup orchestration.
//!
//! The [`BackupManager`] sequences one backup run:
//! - collect files changed since the last successful snapshot
//! - upload them as a new snapshot
//! - prune snapshots beyond the retention count
//!
//! It also owns the optional periodic scheduler. At most one run executes at a
//! time; a second caller is turned away immediately instead of queuing.

pub mod job;

use crate::fs::{Collection, FileCollector};
use crate::snapshot::{self, SnapshotReport};
use crate::storage::StorageProvider;
use crate::utils::errors::{join_errors, BackupError};
use crate::utils::format_bytes;
use crate::Result;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use job::{BackupJob, JobStatus, JobSummary};

/// Backup settings, fixed for the lifetime of a manager.
#[derive(Clone, Default)]
pub struct BackupConfig {
    /// Storage backend snapshots are written to
    pub provider: Option<Arc<dyn StorageProvider>>,

    /// Files or directories to back up, in label order
    pub paths: Vec<PathBuf>,

    /// Interval between scheduled runs (zero disables the scheduler)
    pub schedule: Duration,

    /// Snapshots to keep (zero disables pruning)
    pub retention: usize,
}

impl fmt::Debug for BackupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupConfig")
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .field("paths", &self.paths)
            .field("schedule", &self.schedule)
            .field("retention", &self.retention)
            .finish()
    }
}

/// Shared mutable state. Held only for flag flips, never across I/O.
#[derive(Default)]
struct ManagerState {
    job_running: bool,
    scheduler: Option<SchedulerHandle>,
    last_snapshot_time: Option<DateTime<Utc>>,
}

struct SchedulerHandle {
    stop: CancellationToken,
    done: JoinHandle<()>,
}

/// Orchestrates scheduled and on-demand backups.
pub struct BackupManager {
    config: BackupConfig,
    state: Arc<Mutex<ManagerState>>,
}

impl BackupManager {
    pub fn new(config: BackupConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(ManagerState::default())),
        }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// The configured storage backend, if any.
    pub fn provider(&self) -> Option<Arc<dyn StorageProvider>> {
        self.config.provider.clone()
    }

    /// Cutoff used by the next run: the timestamp of the newest snapshot this manager created.
    pub fn last_snapshot_time(&self) -> Option<DateTime<Utc>> {
        self.lock().last_snapshot_time
    }

    pub fn is_scheduler_running(&self) -> bool {
        self.lock().scheduler.is_some()
    }

    pub fn is_job_running(&self) -> bool {
        self.lock().job_running
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start periodic backups. The first run begins immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.config.provider.is_none() {
            return Err(BackupError::Config("backup provider is required".to_string()));
        }
        if self.config.schedule.is_zero() {
            warn!("Backup schedule disabled");
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BackupError::Config(format!("backup scheduler needs a runtime: {}", e)))?;

        let mut state = self.lock();
        if state.scheduler.is_some() {
            return Err(BackupError::AlreadyStarted);
        }

        let stop = CancellationToken::new();
        let done = runtime.spawn(Arc::clone(self).run_scheduler(stop.clone()));
        state.scheduler = Some(SchedulerHandle { stop, done });
        drop(state);

        info!("Starting backup manager (every {}s)", self.config.schedule.as_secs());
        Ok(())
    }

    /// Stop periodic backups and wait for the scheduler task to exit.
    ///
    /// A run already in progress finishes first. No-op when not started.
    pub async fn stop(&self) {
        let handle = {
            let mut state = self.lock();
            state.scheduler.take()
        };
        let Some(handle) = handle else {
            return;
        };

        info!("Stopping backup manager");
        handle.stop.cancel();
        if let Err(e) = handle.done.await {
            error!("Backup scheduler task panicked: {}", e);
        }
        info!("Backup manager stopped");
    }

    async fn run_scheduler(self: Arc<Self>, stop: CancellationToken) {
        self.run_scheduled().await;

        let period = self.config.schedule;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => self.run_scheduled().await,
            }
        }
    }

    async fn run_scheduled(&self) {
        match self.run_backup().await {
            Ok(job) => match (job.status, &job.error) {
                (JobStatus::Failed, Some(e)) => {
                    warn!(job_id = %job.id, error = %e, "Scheduled backup failed")
                }
                (JobStatus::Skipped, Some(e)) => {
                    info!(job_id = %job.id, reason = %e, "Scheduled backup skipped")
                }
                _ => {}
            },
            Err(e) => warn!("Scheduled backup not started: {}", e),
        }
    }

    /// Run one backup now.
    ///
    /// Returns `Err` only when the run is refused before it starts: missing
    /// provider or paths, or another run already in flight. Every started run
    /// returns its [`BackupJob`], whose status and error describe the outcome.
    pub async fn run_backup(&self) -> Result<BackupJob> {
        let provider = self
            .config
            .provider
            .clone()
            .ok_or_else(|| BackupError::Config("backup provider is required".to_string()))?;
        if self.config.paths.is_empty() {
            return Err(BackupError::Config("backup paths are required".to_string()));
        }

        let running = RunningGuard::acquire(&self.state)?;
        let cutoff = self.lock().last_snapshot_time;

        let job = BackupJob::start();
        let (job_id, started_at) = (job.id.clone(), job.started_at);
        info!(
            job_id = %job.id,
            cutoff = ?cutoff,
            paths = self.config.paths.len(),
            "Starting backup"
        );

        let collector = FileCollector::new(self.config.paths.clone());
        let retention = self.config.retention;
        // Owned by the blocking task: the run stays marked, and its cutoff
        // lands, even if this future is dropped.
        let task = tokio::task::spawn_blocking(move || {
            let mut job = job;
            execute(provider.as_ref(), &collector, cutoff, retention, &mut job);
            if job.status == JobStatus::Completed {
                if let Some(snapshot) = &job.snapshot {
                    running.advance_cutoff(snapshot.timestamp);
                }
            }
            job
        });

        let job = match task.await {
            Ok(job) => job,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Backup task panicked");
                let mut job = BackupJob::with_id(job_id, started_at);
                job.finish(
                    JobStatus::Failed,
                    Some(BackupError::Io(std::io::Error::other(format!("backup task failed: {}", e)))),
                );
                job
            }
        };

        info!(
            "Backup {} {}: {} files, {}",
            job.id,
            job.status,
            job.files_backed_up,
            format_bytes(job.bytes_backed_up)
        );
        Ok(job)
    }
}

/// Marks a run in flight for as long as it lives.
struct RunningGuard {
    state: Arc<Mutex<ManagerState>>,
}

impl RunningGuard {
    fn acquire(state: &Arc<Mutex<ManagerState>>) -> Result<Self> {
        let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.job_running {
            return Err(BackupError::AlreadyRunning);
        }
        guard.job_running = true;
        Ok(Self {
            state: Arc::clone(state),
        })
    }

    /// Move the cutoff forward, never back.
    fn advance_cutoff(&self, timestamp: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.last_snapshot_time.map_or(true, |t| timestamp > t) {
            state.last_snapshot_time = Some(timestamp);
        }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .job_running = false;
    }
}

/// Collect, snapshot and prune. Runs on the blocking pool.
fn execute(
    provider: &dyn StorageProvider,
    collector: &FileCollector,
    cutoff: Option<DateTime<Utc>>,
    retention: usize,
    job: &mut BackupJob,
) {
    let (files, scan_error) = match collector.collect(cutoff) {
        Ok(Collection { files, errors }) => (files, errors.into_error()),
        Err(e) => (Vec::new(), Some(e)),
    };
    if let Some(e) = &scan_error {
        warn!(job_id = %job.id, error = %e, "Backup file scan completed with errors");
    }

    if files.is_empty() {
        info!("No files to back up for job {}", job.id);
        job.finish(
            JobStatus::Skipped,
            Some(scan_error.unwrap_or(BackupError::NothingToBackup)),
        );
        return;
    }

    let SnapshotReport { snapshot, errors } = match snapshot::create_snapshot(provider, &files) {
        Ok(report) => report,
        Err(e) => {
            error!(job_id = %job.id, error = %e, "Snapshot creation failed");
            job.finish(JobStatus::Failed, join_errors([scan_error, Some(e)]));
            return;
        }
    };
    job.files_backed_up = snapshot.files.len();
    job.bytes_backed_up = snapshot.size;
    job.snapshot = Some(snapshot);

    let retention_error = if retention > 0 {
        match snapshot::delete_snapshot(provider, retention) {
            Ok(report) => report.errors.into_error(),
            Err(e) => Some(e),
        }
    } else {
        None
    };
    if let Some(e) = &retention_error {
        warn!(job_id = %job.id, error = %e, "Failed to enforce snapshot retention");
    }

    job.finish(
        JobStatus::Completed,
        join_errors([scan_error, errors.into_error(), retention_error]),
    );
}
