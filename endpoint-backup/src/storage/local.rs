//! Filesystem-backed storage provider.
//!
//! Every key resolves under a single base directory. Keys are untrusted: a key
//! whose `..` segments would climb above the base is rejected before any
//! filesystem call is made.

use super::compression::{compress_file, copy_file, decompress_file};
use super::{is_compressed_key, key_from_path, StorageProvider};
use crate::utils::errors::{BackupError, ResultExt};
use crate::Result;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Stores backups on a local or mounted filesystem.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    base: PathBuf,
}

impl LocalProvider {
    /// Create a provider rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base: PathBuf = base.into();
        // Normalize `a/./b/` to `a/b` so prefix checks compare like with like.
        let base = base.components().collect();
        Self { base }
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Resolve an untrusted key to a path inside the base directory.
    ///
    /// Resolution is lexical: empty and `.` segments are dropped, `..` pops the
    /// previous segment and fails if nothing is left to pop.
    pub fn resolve(&self, key: &str) -> Result<PathBuf> {
        if self.base.as_os_str().is_empty() {
            return Err(BackupError::Config(
                "local provider base path is required".to_string(),
            ));
        }

        let mut segments: Vec<&str> = Vec::new();
        for segment in key.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(self.traversal(key));
                    }
                }
                other => {
                    // A segment the host reads as anything but one plain name
                    // (`C:`, `a\..\b` on Windows) could escape the base.
                    let mut components = Path::new(other).components();
                    match (components.next(), components.next()) {
                        (Some(Component::Normal(_)), None) => segments.push(other),
                        _ => return Err(self.traversal(key)),
                    }
                }
            }
        }

        let mut resolved = self.base.clone();
        resolved.extend(segments);
        Ok(resolved)
    }

    fn traversal(&self, key: &str) -> BackupError {
        BackupError::PathTraversal {
            key: key.to_string(),
            base: self.base.display().to_string(),
        }
    }

    fn require_key(key: &str) -> Result<()> {
        if key.trim_matches('/').is_empty() {
            return Err(BackupError::Config("remote key is required".to_string()));
        }
        Ok(())
    }

    /// Walk up from `start`, removing directories that are now empty, stopping at the base.
    fn cleanup_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();

        while current != self.base && current.starts_with(&self.base) {
            // remove_dir refuses non-empty directories, which ends the climb.
            if fs::remove_dir(&current).is_err() {
                return;
            }
            debug!(path = %current.display(), "Removed empty directory");
            if !current.pop() {
                return;
            }
        }
    }
}

impl StorageProvider for LocalProvider {
    fn upload(&self, local_path: &Path, remote_key: &str) -> Result<()> {
        if local_path.as_os_str().is_empty() {
            return Err(BackupError::Config("local source path is required".to_string()));
        }
        Self::require_key(remote_key)?;
        let dest = self.resolve(remote_key)?;

        if is_compressed_key(remote_key) {
            compress_file(local_path, &dest)?;
        } else {
            copy_file(local_path, &dest)?;
        }

        debug!(src = %local_path.display(), key = %remote_key, "Stored object");
        Ok(())
    }

    fn download(&self, remote_key: &str, local_path: &Path) -> Result<()> {
        Self::require_key(remote_key)?;
        if local_path.as_os_str().is_empty() {
            return Err(BackupError::Config(
                "local destination path is required".to_string(),
            ));
        }
        let src = self.resolve(remote_key)?;

        let fetched = if is_compressed_key(remote_key) {
            decompress_file(&src, local_path)
        } else {
            copy_file(&src, local_path)
        };
        fetched.map_err(|e| match e {
            BackupError::DecompressionLimit { .. } => e,
            other => BackupError::Download {
                key: remote_key.to_string(),
                source: Box::new(other),
            },
        })?;

        debug!(key = %remote_key, dest = %local_path.display(), "Fetched object");
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = self.resolve(prefix)?;

        match fs::metadata(&root) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context(format!("failed to stat prefix {}", root.display())),
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.context("failed to list backup files")?;
            if entry.file_type().is_dir() {
                continue;
            }
            match entry.path().strip_prefix(&self.base) {
                Ok(relative) => keys.push(key_from_path(relative)),
                Err(_) => warn!(path = %entry.path().display(), "Listed path outside provider base"),
            }
        }

        Ok(keys)
    }

    fn delete(&self, remote_key: &str) -> Result<()> {
        Self::require_key(remote_key)?;
        let target = self.resolve(remote_key)?;

        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(BackupError::Delete {
                    key: remote_key.to_string(),
                    source: Box::new(e.into()),
                })
            }
        }

        if let Some(parent) = target.parent() {
            self.cleanup_empty_dirs(parent);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::metadata::set_modified;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn provider() -> std::io::Result<(TempDir, LocalProvider)> {
        let temp_dir = TempDir::new()?;
        let provider = LocalProvider::new(temp_dir.path().join("store"));
        Ok((temp_dir, provider))
    }

    #[test]
    fn test_upload_plain_key_copies_bytes_and_mtime() -> Result<()> {
        let (temp_dir, provider) = provider()?;
        let src = temp_dir.path().join("config.yaml");
        fs::write(&src, b"key: value")?;
        let when = UNIX_EPOCH + Duration::from_secs(1_690_000_000);
        set_modified(&src, when)?;

        provider.upload(&src, "snapshots/s1/manifest.json")?;

        let stored = provider.base_path().join("snapshots/s1/manifest.json");
        assert_eq!(fs::read(&stored)?, b"key: value");
        assert_eq!(fs::metadata(&stored)?.modified()?, when);
        Ok(())
    }

    #[test]
    fn test_compressed_round_trip() -> Result<()> {
        let (temp_dir, provider) = provider()?;
        let src = temp_dir.path().join("data.log");
        let data = b"line one\nline two\n".repeat(500);
        fs::write(&src, &data)?;

        provider.upload(&src, "snapshots/s1/files/path_0/data.log.gz")?;

        let stored = provider.base_path().join("snapshots/s1/files/path_0/data.log.gz");
        assert_ne!(fs::read(&stored)?, data, "stored object should be compressed");

        let restored = temp_dir.path().join("restore/data.log");
        provider.download("snapshots/s1/files/path_0/data.log.gz", &restored)?;
        assert_eq!(fs::read(&restored)?, data);
        Ok(())
    }

    #[test]
    fn test_traversal_keys_are_rejected() -> Result<()> {
        let (temp_dir, provider) = provider()?;
        let src = temp_dir.path().join("payload");
        fs::write(&src, b"x")?;

        for key in ["../escape.txt", "snapshots/../../escape.txt", "a/b/../../../c"] {
            let err = provider.upload(&src, key).unwrap_err();
            assert!(matches!(err, BackupError::PathTraversal { .. }), "key {key}: {err}");
            assert!(matches!(provider.delete(key), Err(BackupError::PathTraversal { .. })));
            assert!(matches!(provider.list(key), Err(BackupError::PathTraversal { .. })));
        }
        assert!(!temp_dir.path().join("escape.txt").exists());
        // Nothing was created for the rejected keys.
        assert!(!provider.base_path().exists());
        Ok(())
    }

    #[test]
    fn test_resolve_stays_inside_base() -> Result<()> {
        let (_temp_dir, provider) = provider()?;
        let base = provider.base_path().to_path_buf();

        assert_eq!(provider.resolve("a/./b//c")?, base.join("a").join("b").join("c"));
        assert_eq!(provider.resolve("a/../b")?, base.join("b"));
        assert_eq!(provider.resolve("/abs/key")?, base.join("abs").join("key"));
        assert_eq!(provider.resolve("")?, base);
        Ok(())
    }

    #[test]
    fn test_list_returns_relative_forward_slash_keys() -> Result<()> {
        let (temp_dir, provider) = provider()?;
        let src = temp_dir.path().join("f");
        fs::write(&src, b"1")?;

        provider.upload(&src, "snapshots/b/manifest.json")?;
        provider.upload(&src, "snapshots/a/files/path_0/x.gz")?;
        provider.upload(&src, "other/y")?;

        let keys = provider.list("snapshots")?;
        assert_eq!(
            keys,
            vec![
                "snapshots/a/files/path_0/x.gz".to_string(),
                "snapshots/b/manifest.json".to_string(),
            ]
        );
        assert_eq!(provider.list("")?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_list_missing_prefix_is_empty() -> Result<()> {
        let (_temp_dir, provider) = provider()?;
        assert!(provider.list("snapshots")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_delete_is_idempotent_and_prunes_empty_dirs() -> Result<()> {
        let (temp_dir, provider) = provider()?;
        let src = temp_dir.path().join("f");
        fs::write(&src, b"1")?;

        provider.upload(&src, "snapshots/s1/files/path_0/deep/f")?;
        provider.upload(&src, "snapshots/s2/manifest.json")?;

        provider.delete("snapshots/s1/files/path_0/deep/f")?;
        provider.delete("snapshots/s1/files/path_0/deep/f")?;
        provider.delete("never/existed")?;

        assert!(!provider.base_path().join("snapshots/s1").exists());
        assert!(provider.base_path().join("snapshots/s2/manifest.json").exists());
        assert!(provider.base_path().exists());
        Ok(())
    }

    #[test]
    fn test_transfer_failures_name_the_key() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let provider = LocalProvider::new(temp_dir.path().join("store"));

        let err = provider
            .download("snapshots/missing/manifest.json", &temp_dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(&err, BackupError::Download { key, .. } if key == "snapshots/missing/manifest.json"));

        // A directory where a file is expected cannot be removed as a file.
        std::fs::create_dir_all(temp_dir.path().join("store/snapshots/dir.gz"))?;
        let err = provider.delete("snapshots/dir.gz").unwrap_err();
        assert!(matches!(&err, BackupError::Delete { key, .. } if key == "snapshots/dir.gz"));
        Ok(())
    }

    #[test]
    fn test_empty_key_is_a_config_error() -> Result<()> {
        let (temp_dir, provider) = provider()?;
        let src = temp_dir.path().join("f");
        fs::write(&src, b"1")?;

        assert!(matches!(provider.upload(&src, ""), Err(BackupError::Config(_))));
        assert!(matches!(provider.delete("/"), Err(BackupError::Config(_))));
        Ok(())
    }
}
