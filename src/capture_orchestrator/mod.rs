//! CaptureOrchestrator - Multi-camera capture cycles
//!
//! ## Responsibilities
//!
//! - Trigger all connected cameras once per capture cycle
//! - Advance the cycle index and the total-captures counter
//! - Classify camera-layer failures into capture errors
//! - Export and delete the capture working directory
//!
//! ## Design
//!
//! - Port set is queried once at construction; reconnecting cameras
//!   requires a new orchestrator
//! - Counters only move after a successful cycle, so a retry after a
//!   failure reuses the same file names
//! - One cycle in flight at a time; a concurrent request is rejected,
//!   not queued
//! - Status reads come from a snapshot published on every commit and
//!   never wait for a running capture

mod types;

pub use types::CaptureSettings;

use crate::archive;
use crate::camera_controller::{
    CameraController, CaptureName, FilenameTemplate, MultiCaptureRequest,
};
use crate::change_notifier::{ChangeContext, ChangeNotifier};
use crate::error::{Error, Result};
use crate::models::{StatusChange, StatusDocument};
use crate::status_store::StatusStore;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// Export archive written next to the capture directory
pub const EXPORT_FILE_NAME: &str = "conventional.zip";

/// CaptureOrchestrator instance
pub struct CaptureOrchestrator {
    data_dir: PathBuf,
    controller: Arc<dyn CameraController>,
    settings: CaptureSettings,
    ports: Vec<String>,
    notifier: Mutex<ChangeNotifier<StatusDocument>>,
    snapshot: Arc<RwLock<StatusDocument>>,
}

impl CaptureOrchestrator {
    /// Create new CaptureOrchestrator
    ///
    /// # Arguments
    /// * `data_dir` - Capture working directory (created if missing)
    /// * `status_file` - Status file name inside `data_dir`
    /// * `controller` - Camera implementation chosen by the caller
    /// * `settings` - Delay, interval, strategy and timeout for every cycle
    pub async fn new(
        data_dir: impl Into<PathBuf>,
        status_file: &str,
        controller: Arc<dyn CameraController>,
        settings: CaptureSettings,
    ) -> Result<Self> {
        let data_dir = data_dir.into();
        let ports = controller.ports().await?;

        let store = StatusStore::new(data_dir.join(status_file));
        let status = store
            .load()?
            .unwrap_or_else(StatusDocument::initial_capture);

        tokio::fs::create_dir_all(&data_dir).await?;

        let snapshot = Arc::new(RwLock::new(status.clone()));
        let mut notifier = ChangeNotifier::new(status.clone());
        notifier.add_listener("onSaveStatus", move |new: &StatusDocument, _: &StatusDocument, _: &ChangeContext| {
            store.save(new)
        });
        let published = snapshot.clone();
        notifier.add_listener("onPublishStatus", move |new: &StatusDocument, _: &StatusDocument, _: &ChangeContext| {
            publish(&published, new.clone());
            Ok(())
        });

        tracing::info!(
            data_dir = %data_dir.display(),
            controller = controller.name(),
            cameras = ports.len(),
            index = status.index,
            total_captures = status.total_captures,
            "CaptureOrchestrator initialized"
        );

        Ok(Self {
            data_dir,
            controller,
            settings,
            ports,
            notifier: Mutex::new(notifier),
            snapshot,
        })
    }

    /// Connected camera ports, fixed for this instance
    pub fn ports(&self) -> &[String] {
        &self.ports
    }

    /// Capture working directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Camera implementation name
    pub fn controller_name(&self) -> &'static str {
        self.controller.name()
    }

    /// Current status (no I/O, never waits on a capture)
    pub fn get_status(&self) -> StatusDocument {
        read_snapshot(&self.snapshot)
    }

    /// Run one capture cycle across all cameras
    ///
    /// Returns the captured file paths ordered by camera position.
    pub async fn capture_cycle(&self) -> Result<Vec<PathBuf>> {
        let mut notifier = self.notifier.try_lock().map_err(|_| {
            Error::JobBusy("Capture in progress, cannot start another until it has finished".to_string())
        })?;

        if self.ports.is_empty() {
            return Err(Error::Capture("No cameras connected".to_string()));
        }

        let status = notifier.model().clone();
        let request = MultiCaptureRequest {
            ports: self.ports.clone(),
            template: FilenameTemplate::for_cycle(status.index),
            dir: self.data_dir.clone(),
            delay: self.settings.delay,
            interval: self.settings.interval,
            strategy: self.settings.strategy,
            timeout: self.settings.timeout,
        };

        // TODO: fall back to sequential capture when a simultaneous cycle times out
        let paths = self.controller.multi_capture(&request).await.map_err(|e| {
            tracing::warn!(
                index = status.index,
                error = %e,
                "Capture cycle failed"
            );
            Error::from(e)
        })?;

        notifier.request_update(StatusChange::Index(status.index + 1));
        notifier.request_update(StatusChange::TotalCaptures(
            status.total_captures + self.ports.len() as u64,
        ));
        notifier.commit(&ChangeContext::new("capture"))?;

        tracing::info!(
            index = status.index,
            frames = paths.len(),
            total_captures = status.total_captures + self.ports.len() as u64,
            "Capture cycle complete"
        );

        Ok(paths)
    }

    /// Captured files of one cycle, sorted by name
    pub async fn images_by_index(&self, index: u64) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut images = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let matches = name
                .to_str()
                .and_then(CaptureName::parse)
                .is_some_and(|parsed| parsed.index == index);
            if matches {
                images.push(entry.path());
            }
        }
        images.sort();

        Ok(images)
    }

    /// Zip the capture directory into `<data_dir>/../conventional.zip`
    pub async fn export(&self) -> Result<PathBuf> {
        let _guard = self.notifier.lock().await;

        let parent = self.data_dir.parent().ok_or_else(|| {
            Error::Persistence(format!("{} has no parent directory", self.data_dir.display()))
        })?;
        let zip_path = archive::package_dir(&self.data_dir, &parent.join(EXPORT_FILE_NAME)).await?;

        tracing::info!(zip = %zip_path.display(), "Captures exported");
        Ok(zip_path)
    }

    /// Remove the capture directory and start counting from zero
    ///
    /// Not guarded: waits for a running cycle instead of refusing.
    pub async fn delete(&self) -> Result<()> {
        let mut notifier = self.notifier.lock().await;

        match tokio::fs::remove_dir_all(&self.data_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let initial = StatusDocument::initial_capture();
        notifier.replace(initial.clone());
        publish(&self.snapshot, initial);

        tracing::info!(data_dir = %self.data_dir.display(), "Capture directory deleted");
        Ok(())
    }
}

fn publish(snapshot: &RwLock<StatusDocument>, doc: StatusDocument) {
    match snapshot.write() {
        Ok(mut guard) => *guard = doc,
        Err(poisoned) => *poisoned.into_inner() = doc,
    }
}

fn read_snapshot(snapshot: &RwLock<StatusDocument>) -> StatusDocument {
    match snapshot.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}
