//! Snapshot lifecycle against a storage provider.
//!
//! Layout under the provider namespace:
//!
//! ```text
//! snapshots/<snapshot-id>/files/<root-label>/<relative-path>.gz
//! snapshots/<snapshot-id>/manifest.json
//! ```
//!
//! The manifest is written last. If its upload fails the file objects already
//! stored under the snapshot id stay behind; listing never sees them because
//! listing is manifest-driven.

pub mod manifest;

use crate::fs::BackupFile;
use crate::storage::{join_key, with_compressed_suffix, StorageProvider};
use crate::utils::errors::{BackupError, ErrorList, ResultExt};
use crate::Result;
use chrono::Utc;
use std::fs;
use tracing::{debug, info, warn};

pub use manifest::{new_snapshot_id, Snapshot, SnapshotFile};

pub const SNAPSHOT_ROOT: &str = "snapshots";
pub const FILES_DIR: &str = "files";
pub const MANIFEST_NAME: &str = "manifest.json";

/// A created snapshot plus the per-file uploads that failed along the way.
#[derive(Debug)]
pub struct SnapshotReport {
    pub snapshot: Snapshot,
    pub errors: ErrorList,
}

/// Snapshots that decoded, oldest first, plus the manifests that did not.
#[derive(Debug, Default)]
pub struct SnapshotListing {
    pub snapshots: Vec<Snapshot>,
    pub errors: ErrorList,
}

/// Ids of snapshots fully removed by a retention pass, plus the failures.
#[derive(Debug, Default)]
pub struct PruneReport {
    pub removed: Vec<String>,
    pub errors: ErrorList,
}

/// Key of the manifest for snapshot `id`.
pub fn manifest_key(id: &str) -> String {
    join_key([SNAPSHOT_ROOT, id, MANIFEST_NAME])
}

/// Key a collected file is stored under inside snapshot `id`.
pub fn file_key(id: &str, snapshot_path: &str) -> String {
    with_compressed_suffix(&join_key([SNAPSHOT_ROOT, id, FILES_DIR, snapshot_path]))
}

pub fn is_manifest_key(key: &str) -> bool {
    key.trim_end_matches('/').rsplit('/').next() == Some(MANIFEST_NAME)
}

/// Upload `files` as a new snapshot and persist its manifest.
///
/// Individual upload failures are collected into the report. The call fails
/// when `files` is empty, when no file uploads, or when the manifest cannot be
/// written or uploaded.
pub fn create_snapshot(provider: &dyn StorageProvider, files: &[BackupFile]) -> Result<SnapshotReport> {
    if files.is_empty() {
        return Err(BackupError::Config("no files provided for snapshot".to_string()));
    }

    let mut snapshot = Snapshot::new(new_snapshot_id(), Utc::now());
    let mut errors = ErrorList::new();

    info!(
        snapshot_id = %snapshot.id,
        files = files.len(),
        provider = provider.name(),
        "Creating snapshot"
    );

    for file in files {
        let key = file_key(&snapshot.id, &file.snapshot_path);

        if let Err(e) = provider.upload(&file.source_path, &key) {
            let err = BackupError::Upload {
                path: file.source_path.display().to_string(),
                source: Box::new(e),
            };
            warn!(path = %file.source_path.display(), error = %err, "Backup upload failed");
            errors.push(err);
            continue;
        }

        snapshot.push_file(SnapshotFile {
            source_path: file.source_path.to_string_lossy().into_owned(),
            backup_path: key,
            size: file.size,
            mod_time: file.mod_time,
        });
    }

    if snapshot.files.is_empty() {
        return Err(errors
            .into_error()
            .unwrap_or_else(|| BackupError::Config("no files uploaded".to_string())));
    }

    // Dropping the temp file removes it, whichever way this returns.
    let manifest = manifest::write_manifest(&snapshot)?;
    provider
        .upload(manifest.path(), &manifest_key(&snapshot.id))
        .context("failed to upload snapshot manifest")?;

    info!(
        "Snapshot {} created: {} files, {} bytes, {} failed",
        snapshot.id,
        snapshot.files.len(),
        snapshot.size,
        errors.len()
    );

    Ok(SnapshotReport { snapshot, errors })
}

/// Every snapshot whose manifest can be fetched and decoded, oldest first.
///
/// Bad manifests are skipped and reported. The call fails only when listing
/// itself fails, or when nothing decoded and something went wrong.
pub fn list_snapshots(provider: &dyn StorageProvider) -> Result<SnapshotListing> {
    let keys = provider.list(SNAPSHOT_ROOT)?;

    let scratch = tempfile::Builder::new()
        .prefix("snapshot-manifests-")
        .tempdir()
        .context("failed to create temp manifest directory")?;

    let mut snapshots = Vec::new();
    let mut errors = ErrorList::new();

    for (idx, key) in keys.iter().filter(|k| is_manifest_key(k)).enumerate() {
        let local = scratch.path().join(format!("manifest-{}.json", idx));

        let decoded = provider
            .download(key, &local)
            .map_err(|e| match e {
                BackupError::Download { .. } => e,
                other => BackupError::Download {
                    key: key.clone(),
                    source: Box::new(other),
                },
            })
            .and_then(|_| manifest::read_manifest(&local).context(format!("failed to read manifest {}", key)));

        if let Err(e) = fs::remove_file(&local) {
            debug!(path = %local.display(), error = %e, "Temp manifest already gone");
        }

        match decoded {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping unreadable snapshot manifest");
                errors.push(e);
            }
        }
    }

    snapshots.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    if snapshots.is_empty() {
        if let Some(err) = errors.into_error() {
            return Err(err);
        }
        return Ok(SnapshotListing::default());
    }
    Ok(SnapshotListing { snapshots, errors })
}

/// Prune the oldest snapshots so that at most `retention` remain.
///
/// A retention of zero keeps everything. Each excess snapshot has all of its
/// objects deleted one by one; failures are collected and pruning carries on.
pub fn delete_snapshot(provider: &dyn StorageProvider, retention: usize) -> Result<PruneReport> {
    if retention == 0 {
        return Ok(PruneReport::default());
    }

    let SnapshotListing { snapshots, errors: listing_errors } = list_snapshots(provider)?;
    let mut report = PruneReport {
        removed: Vec::new(),
        errors: listing_errors,
    };

    if snapshots.len() <= retention {
        return Ok(report);
    }

    let excess = snapshots.len() - retention;
    for snapshot in &snapshots[..excess] {
        let prefix = join_key([SNAPSHOT_ROOT, snapshot.id.as_str()]);
        let items = match provider.list(&prefix) {
            Ok(items) => items,
            Err(e) => {
                let err = e.context(format!("failed to list snapshot {}", snapshot.id));
                warn!(snapshot_id = %snapshot.id, error = %err, "Snapshot list failed");
                report.errors.push(err);
                continue;
            }
        };

        let mut clean = true;
        for item in &items {
            if let Err(e) = provider.delete(item) {
                let err = match e {
                    BackupError::Delete { .. } => e,
                    other => BackupError::Delete {
                        key: item.clone(),
                        source: Box::new(other),
                    },
                };
                warn!(key = %item, error = %err, "Snapshot delete failed");
                report.errors.push(err);
                clean = false;
            }
        }

        if clean {
            info!("Pruned snapshot {} ({} objects)", snapshot.id, items.len());
            report.removed.push(snapshot.id.clone());
        }
    }

    Ok(report)
}
