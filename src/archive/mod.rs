//! Archive intake and result packaging
//!
//! ## Responsibilities
//!
//! - Unpack an uploaded archive into a working directory
//!   (`ArchiveExtractor`, zip implementation)
//! - Package a directory into a zip deliverable
//!
//! Zip work is blocking and runs on the blocking thread pool.
//! Whether the unpacked images form a usable stereo set is decided by the
//! calibration job, not here.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Archive intake validator
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    /// Unpack `archive` into `dest`, returning the number of entries
    ///
    /// Fails with `Error::InvalidArchive` when the upload is malformed.
    async fn extract(&self, archive: Vec<u8>, dest: &Path) -> Result<usize>;
}

/// Zip archive extractor
#[derive(Debug, Clone, Default)]
pub struct ZipExtractor;

impl ZipExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArchiveExtractor for ZipExtractor {
    async fn extract(&self, archive: Vec<u8>, dest: &Path) -> Result<usize> {
        let dest = dest.to_path_buf();
        let size = archive.len();

        let entries = tokio::task::spawn_blocking(move || -> Result<usize> {
            let mut zip = ZipArchive::new(Cursor::new(archive))
                .map_err(|e| Error::InvalidArchive(e.to_string()))?;
            let entries = zip.len();
            std::fs::create_dir_all(&dest)?;
            zip.extract(&dest)
                .map_err(|e| Error::InvalidArchive(e.to_string()))?;
            Ok(entries)
        })
        .await
        .map_err(|e| Error::Internal(format!("archive extraction task failed: {}", e)))??;

        tracing::debug!(size, entries, "Archive unpacked");
        Ok(entries)
    }
}

/// Zip every file below `src_dir` into `zip_path`
///
/// Entry names are relative to `src_dir`. Returns `zip_path`.
pub async fn package_dir(src_dir: &Path, zip_path: &Path) -> Result<PathBuf> {
    let src_dir = src_dir.to_path_buf();
    let zip_path = zip_path.to_path_buf();

    tokio::task::spawn_blocking(move || write_zip(&src_dir, &zip_path).map(|_| zip_path))
        .await
        .map_err(|e| Error::Internal(format!("packaging task failed: {}", e)))?
}

fn write_zip(src_dir: &Path, zip_path: &Path) -> Result<()> {
    let file = File::create(zip_path).map_err(|e| {
        Error::Persistence(format!("{} is not a valid path: {}", zip_path.display(), e))
    })?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let packaging_error = |e: zip::result::ZipError| {
        Error::Persistence(format!("cannot write {}: {}", zip_path.display(), e))
    };

    let mut files = 0usize;
    for entry in WalkDir::new(src_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Persistence(e.to_string()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path == zip_path {
            continue;
        }

        let name = path
            .strip_prefix(src_dir)
            .map_err(|e| Error::Internal(e.to_string()))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        writer.start_file(name, options).map_err(packaging_error)?;
        let mut input = File::open(path)?;
        std::io::copy(&mut input, &mut writer)?;
        files += 1;
    }

    writer.finish().map_err(packaging_error)?;
    tracing::debug!(zip = %zip_path.display(), files, "Directory packaged");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    /// Build an in-memory zip from `(name, contents)` pairs
    pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn test_extract_zip() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = zip_bytes(&[("capture-0_0.jpg", b"a"), ("set/capture-1_0.jpg", b"b")]);

        let entries = ZipExtractor::new().extract(bytes, dir.path()).await.unwrap();

        assert_eq!(entries, 2);
        assert_eq!(std::fs::read(dir.path().join("capture-0_0.jpg")).unwrap(), b"a");
        assert_eq!(std::fs::read(dir.path().join("set/capture-1_0.jpg")).unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_empty_zip_extracts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let entries = ZipExtractor::new().extract(zip_bytes(&[]), dir.path()).await.unwrap();
        assert_eq!(entries, 0);
    }

    #[tokio::test]
    async fn test_non_zip_is_invalid_archive() {
        let dir = tempfile::tempdir().unwrap();
        let jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x02, 0xFF, 0xD9];

        let err = ZipExtractor::new().extract(jpeg, dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArchive(_)));
    }

    #[tokio::test]
    async fn test_package_dir_round_trip() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("intrinsics.yaml"), b"fx: 1").unwrap();
        std::fs::create_dir(src.path().join("pairs")).unwrap();
        std::fs::write(src.path().join("pairs/extrinsics.yaml"), b"R: []").unwrap();

        let out = tempfile::tempdir().unwrap();
        let zip_path = package_dir(src.path(), &out.path().join("result.zip")).await.unwrap();

        let mut archive = ZipArchive::new(File::open(zip_path).unwrap()).unwrap();
        let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["intrinsics.yaml", "pairs/extrinsics.yaml"]);
        assert_eq!(archive.by_name("intrinsics.yaml").unwrap().size(), 5);
    }

    #[tokio::test]
    async fn test_package_into_missing_dir_is_persistence_error() {
        let src = tempfile::tempdir().unwrap();
        let err = package_dir(src.path(), Path::new("/nonexistent/dir/out.zip")).await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }
}
