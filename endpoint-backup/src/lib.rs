//! Endpoint Backup Library
//!
//! Incremental, snapshot-based backups for an endpoint agent: file collection,
//! snapshot storage behind pluggable providers, retention and scheduling.

pub mod api;
pub mod config;
pub mod daemon;
pub mod executor;
pub mod fs;
pub mod snapshot;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{BackupConfig, BackupJob, BackupManager, JobStatus};
pub use storage::{LocalProvider, S3Provider, StorageProvider};
pub use utils::errors::{BackupError, ErrorList};
pub type Result<T> = std::result::Result<T, BackupError>;
