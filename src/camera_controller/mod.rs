//! CameraController - Tethered camera access
//!
//! ## Responsibilities
//!
//! - Enumerate connected camera ports
//! - Synchronized multi-camera capture with an enforced timeout
//! - Distinguish timeout failures from other capture failures
//!
//! The implementation is chosen once at startup from configuration;
//! callers only see the `CameraController` trait.

mod gphoto2;
mod mock;
mod types;

pub use gphoto2::Gphoto2Controller;
pub use mock::MockCameraController;
pub use types::*;

use crate::error::Error;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Camera capability consumed by the capture orchestrator
#[async_trait]
pub trait CameraController: Send + Sync {
    /// Implementation name for logs and health output
    fn name(&self) -> &'static str;

    /// Identifiers of the currently connected cameras
    async fn ports(&self) -> Result<Vec<String>, CameraError>;

    /// Trigger every port once, writing one file per camera
    ///
    /// Returns the written paths ordered by camera position.
    async fn multi_capture(&self, request: &MultiCaptureRequest)
        -> Result<Vec<PathBuf>, CameraError>;
}

impl From<CameraError> for Error {
    fn from(e: CameraError) -> Self {
        match e {
            CameraError::Timeout(msg) => Error::CaptureTimeout(msg),
            CameraError::Capture(msg) => Error::Capture(msg),
        }
    }
}

/// Build the configured controller
pub fn build_controller(kind: CameraControllerKind, mock_cameras: usize) -> Arc<dyn CameraController> {
    match kind {
        CameraControllerKind::Gphoto2 => Arc::new(Gphoto2Controller::new()),
        CameraControllerKind::Mock => Arc::new(MockCameraController::new(mock_cameras)),
    }
}
