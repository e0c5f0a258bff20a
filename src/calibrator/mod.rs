//! Calibrator - External stereo calibration routine
//!
//! The calibration math lives outside this crate. `CommandCalibrator` runs
//! the configured program as `<program> <images_dir> <output_dir>`;
//! `MockCalibrator` stands in for it during development and tests.

use crate::error::Error;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Notify;

/// Calibration routine failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalibrationError {
    #[error("calibration timed out: {0}")]
    Timeout(String),
    #[error("calibration failed: {0}")]
    Failed(String),
}

impl From<CalibrationError> for Error {
    fn from(e: CalibrationError) -> Self {
        Error::Calibration(e.to_string())
    }
}

/// Which calibrator implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibratorKind {
    Command,
    Mock,
}

impl FromStr for CalibratorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "command" => Ok(Self::Command),
            "mock" => Ok(Self::Mock),
            other => Err(format!("unknown calibrator '{}'", other)),
        }
    }
}

/// Stereo calibration capability
#[async_trait]
pub trait Calibrator: Send + Sync {
    /// Compute calibration parameters from `images_dir` into `output_dir`
    async fn calibrate(&self, images_dir: &Path, output_dir: &Path) -> Result<(), CalibrationError>;
}

/// Runs an external calibration program
pub struct CommandCalibrator {
    program: String,
    timeout: Duration,
}

impl CommandCalibrator {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Calibrator for CommandCalibrator {
    async fn calibrate(&self, images_dir: &Path, output_dir: &Path) -> Result<(), CalibrationError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| CalibrationError::Failed(format!("cannot create {}: {}", output_dir.display(), e)))?;

        let child = Command::new(&self.program)
            .arg(images_dir)
            .arg(output_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CalibrationError::Failed(format!("{} spawn failed: {}", self.program, e)))?;

        tracing::info!(
            program = %self.program,
            images_dir = %images_dir.display(),
            "Calibration started"
        );

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(CalibrationError::Failed(format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                )))
            }
            Ok(Err(e)) => Err(CalibrationError::Failed(format!(
                "{} execution failed: {}",
                self.program, e
            ))),
            Err(_) => {
                tracing::warn!(
                    program = %self.program,
                    timeout_sec = self.timeout.as_secs(),
                    "Calibration timeout, process killed via kill_on_drop"
                );
                Err(CalibrationError::Timeout(format!(
                    "{} did not finish within {}s",
                    self.program,
                    self.timeout.as_secs()
                )))
            }
        }
    }
}

/// Stand-in calibrator
///
/// Writes `calibration.yaml` listing the image count. A held calibrator
/// blocks until `release` is called, which lets callers observe the
/// in-progress window.
pub struct MockCalibrator {
    gate: Option<Notify>,
    next_failure: Mutex<Option<CalibrationError>>,
}

impl MockCalibrator {
    /// Finishes immediately
    pub fn new() -> Self {
        Self {
            gate: None,
            next_failure: Mutex::new(None),
        }
    }

    /// Waits for `release` before finishing
    pub fn held() -> Self {
        Self {
            gate: Some(Notify::new()),
            next_failure: Mutex::new(None),
        }
    }

    /// Let one held calibration finish
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    /// Make the next calibration fail
    pub fn fail_next(&self, error: CalibrationError) {
        if let Ok(mut slot) = self.next_failure.lock() {
            *slot = Some(error);
        }
    }
}

impl Default for MockCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Calibrator for MockCalibrator {
    async fn calibrate(&self, images_dir: &Path, output_dir: &Path) -> Result<(), CalibrationError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let failure = self.next_failure.lock().ok().and_then(|mut slot| slot.take());
        if let Some(error) = failure {
            return Err(error);
        }

        let images = walkdir::WalkDir::new(images_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count();

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| CalibrationError::Failed(e.to_string()))?;
        tokio::fs::write(
            output_dir.join("calibration.yaml"),
            format!("calibrator: mock\nimages: {}\n", images),
        )
        .await
        .map_err(|e| CalibrationError::Failed(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_mock_writes_parameters() {
        let images = tempfile::tempdir().unwrap();
        std::fs::write(images.path().join("capture-0_0.jpg"), b"x").unwrap();
        let out = tempfile::tempdir().unwrap();

        MockCalibrator::new().calibrate(images.path(), out.path()).await.unwrap();

        let yaml = std::fs::read_to_string(out.path().join("calibration.yaml")).unwrap();
        assert!(yaml.contains("images: 1"));
    }

    #[tokio::test]
    async fn test_held_mock_waits_for_release() {
        let images = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let calibrator = Arc::new(MockCalibrator::held());

        let task = {
            let calibrator = calibrator.clone();
            let images = images.path().to_path_buf();
            let out = out.path().to_path_buf();
            tokio::spawn(async move { calibrator.calibrate(&images, &out).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        calibrator.release();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_missing_program_fails() {
        let images = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let calibrator = CommandCalibrator::new("/nonexistent/stereo-calibrate", Duration::from_secs(1));

        let err = calibrator.calibrate(images.path(), out.path()).await.unwrap_err();
        assert!(matches!(err, CalibrationError::Failed(_)));
    }

    #[test]
    fn test_calibration_error_maps_to_crate_error() {
        let err: Error = CalibrationError::Timeout("10s".to_string()).into();
        assert!(matches!(err, Error::Calibration(ref m) if m.contains("timed out")));
    }
}
