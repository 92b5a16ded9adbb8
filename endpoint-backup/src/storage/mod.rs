//! Storage backends for snapshot content.
//!
//! A provider exposes a flat namespace of `/`-separated keys. Keys ending in
//! [`COMPRESSED_SUFFIX`] are gzip-compressed on upload and decompressed on
//! download; every other key is stored byte for byte.

pub mod compression;
pub mod local;
pub mod s3;

use crate::Result;
use std::path::{Component, Path};

pub use local::LocalProvider;
pub use s3::S3Provider;

/// Key suffix that doubles as the compression signal.
pub const COMPRESSED_SUFFIX: &str = ".gz";

/// Capability contract every storage backend implements.
///
/// Calls are blocking; async callers run them on the blocking pool.
pub trait StorageProvider: Send + Sync {
    /// Store the file at `local_path` under `remote_key`.
    fn upload(&self, local_path: &Path, remote_key: &str) -> Result<()>;

    /// Fetch `remote_key` into `local_path`, creating parent directories.
    fn download(&self, remote_key: &str, local_path: &Path) -> Result<()>;

    /// Every object key under `prefix`. A missing prefix is an empty list.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove `remote_key`. Removing a missing key succeeds.
    fn delete(&self, remote_key: &str) -> Result<()>;

    /// Short backend name for log lines.
    fn name(&self) -> &'static str;
}

pub fn is_compressed_key(key: &str) -> bool {
    key.ends_with(COMPRESSED_SUFFIX)
}

/// Append the compression suffix unless the key already carries it.
pub fn with_compressed_suffix(key: &str) -> String {
    if is_compressed_key(key) {
        key.to_string()
    } else {
        format!("{}{}", key, COMPRESSED_SUFFIX)
    }
}

/// Join key segments with `/`, skipping empty ones.
pub fn join_key<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    segments
        .into_iter()
        .flat_map(|s| s.split('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Render a relative host path as a key, using `/` whatever the host separator.
pub fn key_from_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_compressed_suffix_is_appended_once() {
        assert_eq!(with_compressed_suffix("a/b.txt"), "a/b.txt.gz");
        assert_eq!(with_compressed_suffix("a/b.tar.gz"), "a/b.tar.gz");
        assert!(is_compressed_key("x.gz"));
        assert!(!is_compressed_key("manifest.json"));
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key(["snapshots", "id-1", "files", "path_0/a.txt"]), "snapshots/id-1/files/path_0/a.txt");
        assert_eq!(join_key(["snapshots/", "", "/x"]), "snapshots/x");
    }

    #[test]
    fn test_key_from_path_uses_forward_slashes() {
        let path: PathBuf = ["path_0", "nested", "file.txt"].iter().collect();
        assert_eq!(key_from_path(&path), "path_0/nested/file.txt");
    }
}
