//! Snapshot manifest types.
//!
//! A manifest is stored as `snapshots/<id>/manifest.json` next to the files it
//! describes. It is the only record of a snapshot: objects without a manifest
//! are never listed.

use crate::utils::errors::{BackupError, ResultExt};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// A point-in-time backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub files: Vec<SnapshotFile>,
    pub size: u64,
}

/// Metadata for a backed-up file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFile {
    pub source_path: String,
    pub backup_path: String,
    pub size: u64,
    pub mod_time: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(id: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            timestamp,
            files: Vec::new(),
            size: 0,
        }
    }

    pub fn push_file(&mut self, file: SnapshotFile) {
        self.size += file.size;
        self.files.push(file);
    }

    /// Reject manifests whose id could not have been produced by [`new_snapshot_id`].
    ///
    /// The id becomes a key prefix during pruning, so it must be one plain segment.
    pub fn validate(&self) -> Result<()> {
        let id = self.id.as_str();
        if id.is_empty() || id == "." || id == ".." || id.contains('/') || id.contains('\\') {
            return Err(BackupError::Manifest(format!("invalid snapshot id {:?}", id)));
        }
        Ok(())
    }
}

/// `snapshot-<UTC timestamp>-<random hex>`.
///
/// Collisions are improbable, not impossible: two snapshots created in the
/// same second share 32 random bits.
pub fn new_snapshot_id() -> String {
    new_id("snapshot")
}

pub fn new_job_id() -> String {
    new_id("job")
}

fn new_id(prefix: &str) -> String {
    let random: String = Uuid::new_v4().as_bytes()[..4]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("{}-{}-{}", prefix, Utc::now().format("%Y%m%dT%H%M%SZ"), random)
}

/// Serialize `snapshot` into a temporary file that is deleted when the handle drops.
pub fn write_manifest(snapshot: &Snapshot) -> Result<NamedTempFile> {
    let mut temp = tempfile::Builder::new()
        .prefix("snapshot-manifest-")
        .suffix(".json")
        .tempfile()
        .context("failed to create snapshot manifest")?;

    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        serde_json::to_writer(&mut writer, snapshot).context("failed to encode snapshot manifest")?;
        writer.flush().context("failed to write snapshot manifest")?;
    }

    Ok(temp)
}

/// Decode and validate a manifest file.
pub fn read_manifest(path: &Path) -> Result<Snapshot> {
    let file = File::open(path).context(format!("failed to open manifest {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))
        .context(format!("failed to decode manifest {}", path.display()))?;
    snapshot.validate()?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::new(
            "snapshot-20240102T030405Z-0a1b2c3d".to_string(),
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        );
        snapshot.push_file(SnapshotFile {
            source_path: "/etc/hosts".to_string(),
            backup_path: "snapshots/snapshot-20240102T030405Z-0a1b2c3d/files/path_0/hosts.gz".to_string(),
            size: 120,
            mod_time: Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap(),
        });
        snapshot
    }

    #[test]
    fn test_manifest_round_trip() -> Result<()> {
        let snapshot = sample();
        let temp = write_manifest(&snapshot)?;
        let decoded = read_manifest(temp.path())?;
        assert_eq!(decoded, snapshot);
        Ok(())
    }

    #[test]
    fn test_manifest_wire_format() -> Result<()> {
        let value = serde_json::to_value(sample())?;
        assert_eq!(value["id"], "snapshot-20240102T030405Z-0a1b2c3d");
        assert_eq!(value["timestamp"], "2024-01-02T03:04:05Z");
        assert_eq!(value["size"], 120);
        let file = &value["files"][0];
        assert_eq!(file["sourcePath"], "/etc/hosts");
        assert_eq!(file["modTime"], "2023-12-31T23:59:59Z");
        assert!(file["backupPath"].as_str().unwrap().ends_with("hosts.gz"));
        Ok(())
    }

    #[test]
    fn test_manifest_temp_file_is_removed_on_drop() -> Result<()> {
        let temp = write_manifest(&sample())?;
        let path = temp.path().to_path_buf();
        assert!(path.exists());
        drop(temp);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_invalid_ids_are_rejected() {
        for id in ["", "..", "a/b", "..\\up"] {
            let snapshot = Snapshot::new(id.to_string(), Utc::now());
            assert!(snapshot.validate().is_err(), "id {:?}", id);
        }
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_id_format() {
        let id = new_snapshot_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "snapshot");
        assert_eq!(parts[1].len(), "20240102T030405Z".len());
        assert_eq!(parts[2].len(), 8);
        assert!(new_job_id().starts_with("job-"));
    }
}
