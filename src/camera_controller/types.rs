//! Camera controller type definitions

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

/// Placeholder the controller replaces with each camera's position
pub const CAMERA_ID_PLACEHOLDER: &str = "${cameraID}";

/// Capture file naming prefix shared by capture and calibration
pub const CAPTURE_PREFIX: &str = "capture-";

/// Camera layer failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    /// Device did not finish in time
    #[error("{0}")]
    Timeout(String),
    /// Any other device failure
    #[error("{0}")]
    Capture(String),
}

/// Which controller implementation drives the cameras
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraControllerKind {
    Gphoto2,
    Mock,
}

impl FromStr for CameraControllerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gphoto2" => Ok(Self::Gphoto2),
            "mock" => Ok(Self::Mock),
            other => Err(format!("unknown camera controller '{}'", other)),
        }
    }
}

/// How the cameras of one cycle are triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiCaptureStrategy {
    /// All cameras triggered together, staggered by `interval`
    Simultaneous,
    /// One camera after another, `interval` apart
    Sequential,
}

impl Default for MultiCaptureStrategy {
    fn default() -> Self {
        Self::Simultaneous
    }
}

impl FromStr for MultiCaptureStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simultaneous" | "simultaneouscapture" => Ok(Self::Simultaneous),
            "sequential" | "sequentialcapture" => Ok(Self::Sequential),
            other => Err(format!("unknown multi-capture strategy '{}'", other)),
        }
    }
}

/// Per-cycle filename template
///
/// The capture index is already substituted; `${cameraID}` is left for the
/// controller to fill per camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameTemplate(String);

impl FilenameTemplate {
    /// Template for one capture cycle: `capture-${cameraID}_<index>.jpg`
    pub fn for_cycle(index: u64) -> Self {
        Self(format!(
            "{}{}_{}.jpg",
            CAPTURE_PREFIX, CAMERA_ID_PLACEHOLDER, index
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name for the camera at position `camera_id`
    pub fn render(&self, camera_id: usize) -> String {
        self.0.replace(CAMERA_ID_PLACEHOLDER, &camera_id.to_string())
    }
}

/// Camera and capture index parsed from a capture file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureName {
    pub camera_id: u32,
    pub index: u64,
}

impl CaptureName {
    /// Parse `capture-<cameraID>_<index>.<jpg|jpeg|png|tif|tiff>`
    pub fn parse(file_name: &str) -> Option<Self> {
        static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            regex::Regex::new(r"^capture-(\d+)_(\d+)\.(?i:jpe?g|png|tiff?)$")
                .expect("capture name pattern is valid")
        });

        let caps = pattern.captures(file_name)?;
        Some(Self {
            camera_id: caps[1].parse().ok()?,
            index: caps[2].parse().ok()?,
        })
    }
}

/// One synchronized capture across a port set
#[derive(Debug, Clone)]
pub struct MultiCaptureRequest {
    pub ports: Vec<String>,
    pub template: FilenameTemplate,
    pub dir: PathBuf,
    /// Wait before the first trigger
    pub delay: Duration,
    /// Spacing between camera triggers
    pub interval: Duration,
    pub strategy: MultiCaptureStrategy,
    /// Upper bound for the whole cycle
    pub timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_render() {
        let template = FilenameTemplate::for_cycle(7);
        assert_eq!(template.as_str(), "capture-${cameraID}_7.jpg");
        assert_eq!(template.render(0), "capture-0_7.jpg");
        assert_eq!(template.render(1), "capture-1_7.jpg");
    }

    #[test]
    fn test_capture_name_parse() {
        assert_eq!(
            CaptureName::parse("capture-1_12.jpg"),
            Some(CaptureName { camera_id: 1, index: 12 })
        );
        assert_eq!(
            CaptureName::parse("capture-0_3.TIFF"),
            Some(CaptureName { camera_id: 0, index: 3 })
        );
        assert!(CaptureName::parse("capture-1_12.txt").is_none());
        assert!(CaptureName::parse("thumb-capture-1_12.jpg").is_none());
        assert!(CaptureName::parse("capture-a_1.jpg").is_none());
    }

    #[test]
    fn test_strategy_from_config() {
        assert_eq!(
            "sequentialCapture".parse::<MultiCaptureStrategy>().unwrap(),
            MultiCaptureStrategy::Sequential
        );
        assert_eq!(
            " Simultaneous ".parse::<MultiCaptureStrategy>().unwrap(),
            MultiCaptureStrategy::Simultaneous
        );
        assert!("burst".parse::<MultiCaptureStrategy>().is_err());
        assert_eq!("mock".parse::<CameraControllerKind>().unwrap(), CameraControllerKind::Mock);
    }
}
