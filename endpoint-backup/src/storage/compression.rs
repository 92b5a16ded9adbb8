//! Gzip codec used by file-backed providers.

use crate::fs::metadata::{copy_modified, gzip_mtime};
use crate::utils::errors::{BackupError, ResultExt};
use crate::Result;
use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Hard ceiling on the size of a single decompressed object (2 GiB).
pub const MAX_DECOMPRESSED_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Gzip `src` into `dest`, recording the source name and modification time in the header.
pub fn compress_file(src: &Path, dest: &Path) -> Result<()> {
    let src_file = File::open(src).context(format!("failed to open source file {}", src.display()))?;
    let src_meta = src_file
        .metadata()
        .context(format!("failed to stat source file {}", src.display()))?;

    ensure_parent_dir(dest)?;
    let dest_file = File::create(dest)
        .context(format!("failed to create destination file {}", dest.display()))?;

    let name = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mtime = src_meta.modified().map(gzip_mtime).unwrap_or(0);

    let mut encoder = GzBuilder::new()
        .filename(name)
        .mtime(mtime)
        .write(BufWriter::new(dest_file), Compression::default());

    let compressed = io::copy(&mut BufReader::new(src_file), &mut encoder)
        .and_then(|_| encoder.finish())
        .and_then(|mut writer| writer.flush());
    if let Err(e) = compressed {
        remove_partial(dest);
        return Err(e).context(format!("failed to compress {}", src.display()));
    }

    Ok(())
}

/// Gunzip `src` into `dest`, bounded by [`MAX_DECOMPRESSED_SIZE`].
pub fn decompress_file(src: &Path, dest: &Path) -> Result<()> {
    decompress_file_with_limit(src, dest, MAX_DECOMPRESSED_SIZE)
}

/// Gunzip `src` into `dest`, failing once the output would exceed `limit` bytes.
///
/// The partial output is removed when the limit trips.
pub fn decompress_file_with_limit(src: &Path, dest: &Path, limit: u64) -> Result<()> {
    let src_file = File::open(src).context(format!("failed to open source file {}", src.display()))?;

    ensure_parent_dir(dest)?;
    let dest_file = File::create(dest)
        .context(format!("failed to create destination file {}", dest.display()))?;
    let mut writer = BufWriter::new(dest_file);

    // One byte past the limit is enough to tell "exactly at limit" from "over".
    let mut reader = GzDecoder::new(BufReader::new(src_file)).take(limit.saturating_add(1));
    let written = io::copy(&mut reader, &mut writer).and_then(|n| writer.flush().map(|_| n));
    drop(writer);

    let written = match written {
        Ok(n) => n,
        Err(e) => {
            remove_partial(dest);
            return Err(e).context(format!("failed to decompress {}", src.display()));
        }
    };

    if written > limit {
        remove_partial(dest);
        return Err(BackupError::DecompressionLimit {
            path: src.display().to_string(),
            limit,
        });
    }

    Ok(())
}

/// Byte-for-byte copy that keeps the source modification time.
pub fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    let src_meta = fs::metadata(src).context(format!("failed to stat source file {}", src.display()))?;

    ensure_parent_dir(dest)?;
    fs::copy(src, dest).context(format!("failed to copy {} to {}", src.display(), dest.display()))?;
    copy_modified(&src_meta, dest)
        .context(format!("failed to set modification time on {}", dest.display()))?;

    Ok(())
}

/// Drop a half-written output file.
fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("Failed to remove partial output {}: {}", path.display(), e);
    }
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .context(format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::metadata::set_modified;
    use flate2::read::GzDecoder;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    #[test]
    fn test_compress_then_decompress_is_identical() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("report.csv");
        let data: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
        fs::write(&src, &data)?;

        let packed = temp_dir.path().join("out/report.csv.gz");
        let unpacked = temp_dir.path().join("restore/report.csv");
        compress_file(&src, &packed)?;
        decompress_file(&packed, &unpacked)?;

        assert_eq!(fs::read(&unpacked)?, data);
        Ok(())
    }

    #[test]
    fn test_gzip_header_carries_name_and_mtime() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("notes.txt");
        fs::write(&src, b"hello")?;
        set_modified(&src, UNIX_EPOCH + Duration::from_secs(1_700_000_000))?;

        let packed = temp_dir.path().join("notes.txt.gz");
        compress_file(&src, &packed)?;

        let mut decoder = GzDecoder::new(File::open(&packed)?);
        let mut body = Vec::new();
        decoder.read_to_end(&mut body)?;
        assert_eq!(body, b"hello");

        let header = decoder.header().expect("gzip header");
        assert_eq!(header.filename(), Some(&b"notes.txt"[..]));
        assert_eq!(header.mtime(), 1_700_000_000);
        Ok(())
    }

    #[test]
    fn test_decompression_limit_rejects_oversized_payload() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("zeros.bin");
        fs::write(&src, vec![0u8; 10_000])?;

        let packed = temp_dir.path().join("zeros.bin.gz");
        compress_file(&src, &packed)?;

        let out = temp_dir.path().join("zeros.out");
        let err = decompress_file_with_limit(&packed, &out, 1_000).unwrap_err();
        assert!(matches!(err, BackupError::DecompressionLimit { limit: 1_000, .. }));
        assert!(!out.exists());

        // Exactly at the limit is fine.
        decompress_file_with_limit(&packed, &out, 10_000)?;
        assert_eq!(fs::metadata(&out)?.len(), 10_000);
        Ok(())
    }

    #[test]
    fn test_copy_preserves_modification_time() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("a.bin");
        fs::write(&src, b"abc")?;
        let when = UNIX_EPOCH + Duration::from_secs(1_650_000_000);
        set_modified(&src, when)?;

        let dest = temp_dir.path().join("nested/dir/a.bin");
        copy_file(&src, &dest)?;

        assert_eq!(fs::read(&dest)?, b"abc");
        assert_eq!(fs::metadata(&dest)?.modified()?, when);
        Ok(())
    }

    #[test]
    fn test_failed_compression_removes_partial_output() -> Result<()> {
        let temp_dir = TempDir::new()?;
        // Opening a directory succeeds but reading from it does not.
        let unreadable = temp_dir.path().join("not-a-file");
        fs::create_dir(&unreadable)?;
        let dest = temp_dir.path().join("out/not-a-file.gz");

        assert!(compress_file(&unreadable, &dest).is_err());
        assert!(!dest.exists());
        Ok(())
    }

    #[test]
    fn test_decompress_rejects_non_gzip_input() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("plain.gz");
        fs::write(&src, b"definitely not gzip")?;

        let out = temp_dir.path().join("plain.out");
        assert!(decompress_file(&src, &out).is_err());
        Ok(())
    }
}
