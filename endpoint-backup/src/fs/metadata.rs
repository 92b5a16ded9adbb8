//! File metadata handling for backup operations.
//!
//! Modification times are the only metadata a snapshot preserves: they drive
//! incremental selection and are carried across uploads and downloads.

use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Last modification time of `metadata` as a UTC timestamp.
pub fn modified_utc(metadata: &fs::Metadata) -> std::io::Result<DateTime<Utc>> {
    Ok(DateTime::<Utc>::from(metadata.modified()?))
}

/// Modification time as seconds since the Unix epoch, clamped to the gzip header range.
pub fn gzip_mtime(modified: SystemTime) -> u32 {
    modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

/// Set the modification time of the file at `path`.
pub fn set_modified(path: &Path, modified: SystemTime) -> std::io::Result<()> {
    let file = File::options().write(true).open(path)?;
    file.set_modified(modified)
}

/// Copy the modification time of `src` onto `dest`.
pub fn copy_modified(src: &fs::Metadata, dest: &Path) -> std::io::Result<()> {
    set_modified(dest, src.modified()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_set_and_read_modified() -> std::io::Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(b"test content")?;
        temp_file.flush()?;

        let when = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        set_modified(temp_file.path(), when)?;

        let metadata = fs::metadata(temp_file.path())?;
        assert_eq!(modified_utc(&metadata)?.timestamp(), 1_600_000_000);
        assert_eq!(gzip_mtime(metadata.modified()?), 1_600_000_000);

        Ok(())
    }

    #[test]
    fn test_gzip_mtime_before_epoch_is_zero() {
        let before = UNIX_EPOCH - Duration::from_secs(10);
        assert_eq!(gzip_mtime(before), 0);
    }
}
