//! Mock camera controller
//!
//! Writes placeholder JPEG files instead of talking to devices. Used for
//! development without cameras attached and by tests, which can queue a
//! failure for the next capture.

use super::types::*;
use super::CameraController;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Minimal JPEG: SOI, empty APP0, EOI
const PLACEHOLDER_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x02, 0xFF, 0xD9];

/// Test/development controller
pub struct MockCameraController {
    ports: Vec<String>,
    next_failure: Mutex<Option<CameraError>>,
    captures: AtomicUsize,
}

impl MockCameraController {
    /// Controller with `cameras` fake ports (`mock:0`, `mock:1`, ...)
    pub fn new(cameras: usize) -> Self {
        Self {
            ports: (0..cameras).map(|i| format!("mock:{}", i)).collect(),
            next_failure: Mutex::new(None),
            captures: AtomicUsize::new(0),
        }
    }

    /// Make the next `multi_capture` call fail with `error`
    pub fn fail_next(&self, error: CameraError) {
        if let Ok(mut slot) = self.next_failure.lock() {
            *slot = Some(error);
        }
    }

    /// Number of successful multi-capture calls
    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Option<CameraError> {
        self.next_failure.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[async_trait]
impl CameraController for MockCameraController {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn ports(&self) -> Result<Vec<String>, CameraError> {
        Ok(self.ports.clone())
    }

    async fn multi_capture(&self, request: &MultiCaptureRequest) -> Result<Vec<PathBuf>, CameraError> {
        if !request.delay.is_zero() {
            tokio::time::sleep(request.delay).await;
        }

        if let Some(error) = self.take_failure() {
            tracing::debug!(error = %error, "Mock capture failing on request");
            return Err(error);
        }

        tokio::fs::create_dir_all(&request.dir)
            .await
            .map_err(|e| CameraError::Capture(format!("cannot create {}: {}", request.dir.display(), e)))?;

        let mut paths = Vec::with_capacity(request.ports.len());
        for camera_id in 0..request.ports.len() {
            let path = request.dir.join(request.template.render(camera_id));
            tokio::fs::write(&path, PLACEHOLDER_JPEG)
                .await
                .map_err(|e| CameraError::Capture(format!("cannot write {}: {}", path.display(), e)))?;
            paths.push(path);
        }

        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(dir: &std::path::Path, ports: Vec<String>) -> MultiCaptureRequest {
        MultiCaptureRequest {
            ports,
            template: FilenameTemplate::for_cycle(4),
            dir: dir.to_path_buf(),
            delay: Duration::ZERO,
            interval: Duration::ZERO,
            strategy: MultiCaptureStrategy::Simultaneous,
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_writes_one_file_per_camera() {
        let dir = tempfile::tempdir().unwrap();
        let controller = MockCameraController::new(2);
        let ports = controller.ports().await.unwrap();

        let paths = controller.multi_capture(&request(dir.path(), ports)).await.unwrap();

        assert_eq!(paths, vec![dir.path().join("capture-0_4.jpg"), dir.path().join("capture-1_4.jpg")]);
        assert!(paths.iter().all(|p| p.exists()));
        assert_eq!(controller.capture_count(), 1);
    }

    #[tokio::test]
    async fn test_queued_failure_is_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let controller = MockCameraController::new(2);
        let ports = controller.ports().await.unwrap();
        controller.fail_next(CameraError::Timeout("mock timeout".to_string()));

        let err = controller.multi_capture(&request(dir.path(), ports.clone())).await.unwrap_err();
        assert_eq!(err, CameraError::Timeout("mock timeout".to_string()));
        assert_eq!(controller.capture_count(), 0);

        controller.multi_capture(&request(dir.path(), ports)).await.unwrap();
        assert_eq!(controller.capture_count(), 1);
    }
}
