//! gphoto2 camera controller
//!
//! Drives tethered cameras through the `gphoto2` command line tool.

use super::types::*;
use super::CameraController;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::task::JoinSet;

const DEFAULT_BINARY: &str = "gphoto2";
const DETECT_TIMEOUT_SEC: u64 = 10;

/// Real device controller
pub struct Gphoto2Controller {
    binary: String,
}

impl Gphoto2Controller {
    pub fn new() -> Self {
        Self::with_binary(DEFAULT_BINARY)
    }

    /// Use a specific gphoto2 executable
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Capture one frame from one port into `path`
    ///
    /// The child is spawned with kill_on_drop so a cycle timeout that drops
    /// this future also kills the gphoto2 process.
    async fn capture_one(binary: String, port: String, path: PathBuf) -> Result<PathBuf, CameraError> {
        let output = Command::new(&binary)
            .arg("--port")
            .arg(&port)
            .args(["--capture-image-and-download", "--force-overwrite", "--filename"])
            .arg(&path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CameraError::Capture(format!("{} spawn failed: {}", binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CameraError::Capture(format!(
                "capture on port {} failed: {}",
                port,
                stderr.trim()
            )));
        }

        tracing::debug!(port = %port, path = %path.display(), "Frame captured");
        Ok(path)
    }

    async fn capture_all(&self, request: &MultiCaptureRequest) -> Result<Vec<PathBuf>, CameraError> {
        if !request.delay.is_zero() {
            tokio::time::sleep(request.delay).await;
        }

        match request.strategy {
            MultiCaptureStrategy::Sequential => {
                let mut paths = Vec::with_capacity(request.ports.len());
                for (camera_id, port) in request.ports.iter().enumerate() {
                    if camera_id > 0 && !request.interval.is_zero() {
                        tokio::time::sleep(request.interval).await;
                    }
                    let path = request.dir.join(request.template.render(camera_id));
                    paths.push(Self::capture_one(self.binary.clone(), port.clone(), path).await?);
                }
                Ok(paths)
            }
            MultiCaptureStrategy::Simultaneous => {
                let mut tasks = JoinSet::new();
                for (camera_id, port) in request.ports.iter().enumerate() {
                    let binary = self.binary.clone();
                    let port = port.clone();
                    let path = request.dir.join(request.template.render(camera_id));
                    let stagger = request.interval * camera_id as u32;
                    tasks.spawn(async move {
                        if !stagger.is_zero() {
                            tokio::time::sleep(stagger).await;
                        }
                        (camera_id, Self::capture_one(binary, port, path).await)
                    });
                }

                let mut captured = Vec::with_capacity(request.ports.len());
                while let Some(joined) = tasks.join_next().await {
                    let (camera_id, result) = joined
                        .map_err(|e| CameraError::Capture(format!("capture task failed: {}", e)))?;
                    captured.push((camera_id, result?));
                }
                captured.sort_by_key(|(camera_id, _)| *camera_id);
                Ok(captured.into_iter().map(|(_, path)| path).collect())
            }
        }
    }
}

impl Default for Gphoto2Controller {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract port identifiers from `gphoto2 --auto-detect` output
///
/// ```text
/// Model                          Port
/// ----------------------------------------------------------
/// Canon PowerShot G10 (PTP mode) usb:001,004
/// ```
pub fn parse_auto_detect(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip_while(|line| !line.starts_with("---"))
        .skip(1)
        .filter_map(|line| line.split_whitespace().last())
        .filter(|port| port.contains(':'))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl CameraController for Gphoto2Controller {
    fn name(&self) -> &'static str {
        "gphoto2"
    }

    async fn ports(&self) -> Result<Vec<String>, CameraError> {
        let child = Command::new(&self.binary)
            .arg("--auto-detect")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(Duration::from_secs(DETECT_TIMEOUT_SEC), child)
            .await
            .map_err(|_| CameraError::Timeout(format!("{} --auto-detect timed out", self.binary)))?
            .map_err(|e| CameraError::Capture(format!("{} spawn failed: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CameraError::Capture(format!(
                "camera detection failed: {}",
                stderr.trim()
            )));
        }

        let ports = parse_auto_detect(&String::from_utf8_lossy(&output.stdout));
        tracing::info!(count = ports.len(), ports = ?ports, "Cameras detected");
        Ok(ports)
    }

    async fn multi_capture(&self, request: &MultiCaptureRequest) -> Result<Vec<PathBuf>, CameraError> {
        tokio::fs::create_dir_all(&request.dir)
            .await
            .map_err(|e| CameraError::Capture(format!("cannot create {}: {}", request.dir.display(), e)))?;

        match tokio::time::timeout(request.timeout, self.capture_all(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = request.timeout.as_millis() as u64,
                    ports = ?request.ports,
                    "Multi-capture timeout, gphoto2 processes killed"
                );
                Err(CameraError::Timeout(format!(
                    "multi-capture did not finish within {}s",
                    request.timeout.as_secs_f32()
                )))
            }
        }
    }
}
