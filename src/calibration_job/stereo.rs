//! Stereo pair counting
//!
//! Capture images are matched by the capture naming convention anywhere
//! below the search root and taken two per stereo pair. Everything else is
//! ignored.

use crate::camera_controller::CaptureName;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Images making up one stereo pair
pub const IMAGES_PER_PAIR: usize = 2;

/// Count stereo pairs below `dir`
pub async fn count_stereo_pairs(dir: &Path) -> Result<usize> {
    let dir: PathBuf = dir.to_path_buf();
    tokio::task::spawn_blocking(move || count_blocking(&dir))
        .await
        .map_err(|e| Error::Internal(format!("stereo scan task failed: {}", e)))?
}

fn count_blocking(dir: &Path) -> Result<usize> {
    let mut images = 0usize;

    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_str().and_then(CaptureName::parse).is_some() {
            images += 1;
        }
    }

    let pairs = images / IMAGES_PER_PAIR;
    tracing::debug!(dir = %dir.display(), images, pairs, "Stereo pairs counted");
    Ok(pairs)
}
