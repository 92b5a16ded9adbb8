//! File system helpers for backup operations.

pub mod metadata;
pub mod walker;

pub use walker::{BackupFile, Collection, FileCollector};
