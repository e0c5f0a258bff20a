//! StatusStore - Durable status document
//!
//! ## Responsibilities
//!
//! - Single source of truth for "what state is this job in"
//! - One JSON file per job, overwritten wholesale on every save
//! - Survives process restart
//!
//! ## Design
//!
//! - Missing file is a normal state (`Ok(None)`), not an error
//! - Saves go through a temp file in the same directory and an atomic rename,
//!   so a crash leaves either the previous or the new document on disk
//! - I/O failures surface as `Error::Persistence` and are never retried

use crate::error::{Error, Result};
use crate::models::StatusDocument;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// File-backed status document store
#[derive(Debug, Clone)]
pub struct StatusStore {
    path: PathBuf,
}

impl StatusStore {
    /// Create store for the given status file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read and deserialize the status file
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load(&self) -> Result<Option<StatusDocument>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Persistence(format!(
                    "cannot read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let doc = serde_json::from_slice(&raw).map_err(|e| {
            Error::Persistence(format!("cannot parse {}: {}", self.path.display(), e))
        })?;

        Ok(Some(doc))
    }

    /// Serialize and atomically overwrite the status file
    pub fn save(&self, doc: &StatusDocument) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        fs::create_dir_all(parent).map_err(|e| {
            Error::Persistence(format!("cannot create {}: {}", parent.display(), e))
        })?;

        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| {
            Error::Persistence(format!("cannot create temp file in {}: {}", parent.display(), e))
        })?;
        temp.write_all(&bytes)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| Error::Persistence(format!("cannot write temp file: {}", e)))?;
        temp.persist(&self.path).map_err(|e| {
            Error::Persistence(format!("cannot persist {}: {}", self.path.display(), e))
        })?;

        tracing::debug!(path = %self.path.display(), "Status saved");
        Ok(())
    }

    /// Delete the status file if present
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Persistence(format!(
                "cannot remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}
