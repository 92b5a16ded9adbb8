//! Backup candidate collection.
//!
//! Walks every configured root and selects regular files modified after the
//! cutoff of the last successful snapshot. Each root gets a synthetic label
//! (`path_<index>`) so that roots with overlapping file names never collide
//! inside a snapshot.

use super::metadata::modified_utc;
use crate::storage::key_from_path;
use crate::utils::errors::{BackupError, ErrorList, ResultExt};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A file selected for backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    /// Path on the originating machine
    pub source_path: PathBuf,

    /// Snapshot-relative key: `<root label>/<path relative to the root>`
    pub snapshot_path: String,

    /// File size in bytes
    pub size: u64,

    /// Last modification time
    pub mod_time: DateTime<Utc>,
}

/// Result of a collection that found at least one file, or found nothing without errors.
///
/// `errors` holds the per-root and per-file failures that were skipped over.
#[derive(Debug, Default)]
pub struct Collection {
    pub files: Vec<BackupFile>,
    pub errors: ErrorList,
}

/// Enumerates backup candidates under a fixed, ordered set of roots.
#[derive(Debug, Clone)]
pub struct FileCollector {
    roots: Vec<PathBuf>,
}

impl FileCollector {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Collect files modified strictly after `cutoff` (everything when `None`).
    ///
    /// Failures are recorded and collection moves on. If nothing was found and
    /// something failed, the aggregate failure is returned instead.
    pub fn collect(&self, cutoff: Option<DateTime<Utc>>) -> Result<Collection> {
        let mut state = CollectState::default();

        for (idx, root) in self.roots.iter().enumerate() {
            if root.as_os_str().is_empty() {
                state
                    .errors
                    .push(BackupError::Config(format!("backup path at index {} is empty", idx)));
                continue;
            }
            let root: PathBuf = root.components().collect();
            let label = root_label(idx);

            let info = match fs::metadata(&root) {
                Ok(info) => info,
                Err(e) => {
                    state
                        .errors
                        .push(BackupError::from(e).context(format!("failed to stat backup path {}", root.display())));
                    continue;
                }
            };

            if info.is_dir() {
                state.walk_root(&root, &label, cutoff);
            } else if info.is_file() {
                state.add_single_file(&root, &label, &info, cutoff);
            } else {
                debug!(path = %root.display(), "Skipping non-regular backup path");
            }
        }

        let CollectState { mut files, errors, .. } = state;
        files.sort_by(|a, b| a.snapshot_path.cmp(&b.snapshot_path));

        if files.is_empty() {
            return match errors.into_error() {
                Some(err) => Err(err),
                None => Ok(Collection::default()),
            };
        }
        Ok(Collection { files, errors })
    }
}

/// Label under which the root at `idx` appears inside a snapshot.
pub fn root_label(idx: usize) -> String {
    format!("path_{}", idx)
}

/// Incremental selection rule: strictly newer than the cutoff, or no cutoff at all.
pub fn should_include(mod_time: DateTime<Utc>, cutoff: Option<DateTime<Utc>>) -> bool {
    match cutoff {
        None => true,
        Some(cutoff) => mod_time > cutoff,
    }
}

#[derive(Default)]
struct CollectState {
    files: Vec<BackupFile>,
    errors: ErrorList,
    seen: HashSet<String>,
}

impl CollectState {
    fn add_single_file(
        &mut self,
        path: &Path,
        label: &str,
        info: &fs::Metadata,
        cutoff: Option<DateTime<Utc>>,
    ) {
        let mod_time = match modified_utc(info) {
            Ok(t) => t,
            Err(e) => {
                self.errors
                    .push(BackupError::from(e).context(format!("failed to read info for {}", path.display())));
                return;
            }
        };
        if !should_include(mod_time, cutoff) {
            return;
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.push(BackupFile {
            source_path: path.to_path_buf(),
            snapshot_path: format!("{}/{}", label, name),
            size: info.len(),
            mod_time,
        });
    }

    fn walk_root(&mut self, root: &Path, label: &str, cutoff: Option<DateTime<Utc>>) {
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let at = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.display().to_string());
                    self.errors
                        .push(BackupError::from(e).context(format!("walk error for {}", at)));
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() || file_type.is_symlink() {
                continue;
            }

            let info = match entry.metadata() {
                Ok(info) => info,
                Err(e) => {
                    self.errors.push(
                        BackupError::from(e)
                            .context(format!("failed to read info for {}", entry.path().display())),
                    );
                    continue;
                }
            };
            if !info.is_file() {
                continue;
            }

            let mod_time = match modified_utc(&info).context(format!(
                "failed to read modification time for {}",
                entry.path().display()
            )) {
                Ok(t) => t,
                Err(e) => {
                    self.errors.push(e);
                    continue;
                }
            };
            if !should_include(mod_time, cutoff) {
                continue;
            }

            let relative = match entry.path().strip_prefix(root) {
                Ok(relative) => relative,
                Err(e) => {
                    self.errors.push(BackupError::Config(format!(
                        "failed to resolve relative path for {}: {}",
                        entry.path().display(),
                        e
                    )));
                    continue;
                }
            };

            self.push(BackupFile {
                source_path: entry.path().to_path_buf(),
                snapshot_path: format!("{}/{}", label, key_from_path(relative)),
                size: info.len(),
                mod_time,
            });
        }
    }

    /// Keep the first file seen for each snapshot key.
    fn push(&mut self, file: BackupFile) -> bool {
        if !self.seen.insert(file.snapshot_path.clone()) {
            warn!(
                "Duplicate backup path {} from {}, skipping",
                file.snapshot_path,
                file.source_path.display()
            );
            return false;
        }
        self.files.push(file);
        true
    }
}
