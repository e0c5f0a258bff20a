//! Application state
//!
//! Holds configuration and the shared capture and calibration components

use crate::archive::ZipExtractor;
use crate::calibration_job::CalibrationJob;
use crate::calibrator::{Calibrator, CalibratorKind, CommandCalibrator, MockCalibrator};
use crate::camera_controller::{self, CameraControllerKind, MultiCaptureStrategy};
use crate::capture_orchestrator::{CaptureOrchestrator, CaptureSettings};
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Capture working directory below `data_dir`
pub const CAPTURE_SUBDIR: &str = "capture";
/// Calibration working directory below `data_dir`
pub const CALIBRATION_SUBDIR: &str = "calibrate";

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Root of all job directories, served under `data_url_prefix`
    pub data_dir: PathBuf,
    /// Public URL prefix for `data_dir`
    pub data_url_prefix: String,
    /// Status file name inside each job directory
    pub status_file: String,
    pub camera_controller: CameraControllerKind,
    /// Fake cameras exposed by the mock controller
    pub mock_camera_count: usize,
    pub capture: CaptureSettings,
    pub calibrator: CalibratorKind,
    /// External calibration program
    pub calibration_command: String,
    pub calibration_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            data_dir: PathBuf::from("/var/lib/decapod"),
            data_url_prefix: "/data".to_string(),
            status_file: "status.json".to_string(),
            camera_controller: CameraControllerKind::Gphoto2,
            mock_camera_count: 2,
            capture: CaptureSettings::default(),
            calibrator: CalibratorKind::Command,
            calibration_command: "stereo-calibrate".to_string(),
            calibration_timeout: Duration::from_secs(1800),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults
    ///
    /// A variable that is set but cannot be parsed is a `Config` error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let capture = CaptureSettings {
            delay: get("CAPTURE_DELAY_MS")
                .map(|v| parse::<u64>("CAPTURE_DELAY_MS", &v).map(Duration::from_millis))
                .transpose()?
                .unwrap_or(defaults.capture.delay),
            interval: get("CAPTURE_INTERVAL_MS")
                .map(|v| parse::<u64>("CAPTURE_INTERVAL_MS", &v).map(Duration::from_millis))
                .transpose()?
                .unwrap_or(defaults.capture.interval),
            strategy: get("MULTI_CAPTURE")
                .map(|v| parse::<MultiCaptureStrategy>("MULTI_CAPTURE", &v))
                .transpose()?
                .unwrap_or(defaults.capture.strategy),
            timeout: get("CAPTURE_TIMEOUT_SEC")
                .map(|v| parse::<u64>("CAPTURE_TIMEOUT_SEC", &v).map(Duration::from_secs))
                .transpose()?
                .unwrap_or(defaults.capture.timeout),
        };

        let config = Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: get("PORT")
                .map(|v| parse("PORT", &v))
                .transpose()?
                .unwrap_or(defaults.port),
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            data_url_prefix: get("DATA_URL_PREFIX")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.data_url_prefix),
            status_file: get("STATUS_FILE").unwrap_or(defaults.status_file),
            camera_controller: get("CAMERA_CONTROLLER")
                .map(|v| parse("CAMERA_CONTROLLER", &v))
                .transpose()?
                .unwrap_or(defaults.camera_controller),
            mock_camera_count: get("MOCK_CAMERA_COUNT")
                .map(|v| parse("MOCK_CAMERA_COUNT", &v))
                .transpose()?
                .unwrap_or(defaults.mock_camera_count),
            capture,
            calibrator: get("CALIBRATOR")
                .map(|v| parse("CALIBRATOR", &v))
                .transpose()?
                .unwrap_or(defaults.calibrator),
            calibration_command: get("CALIBRATION_COMMAND").unwrap_or(defaults.calibration_command),
            calibration_timeout: get("CALIBRATION_TIMEOUT_SEC")
                .map(|v| parse::<u64>("CALIBRATION_TIMEOUT_SEC", &v).map(Duration::from_secs))
                .transpose()?
                .unwrap_or(defaults.calibration_timeout),
        };

        if !config.data_url_prefix.starts_with('/') || config.data_url_prefix.len() < 2 {
            return Err(Error::Config(format!(
                "DATA_URL_PREFIX must be an absolute path like /data, got '{}'",
                config.data_url_prefix
            )));
        }
        if config.status_file.contains('/') {
            return Err(Error::Config(format!(
                "STATUS_FILE must be a file name, got '{}'",
                config.status_file
            )));
        }

        Ok(config)
    }

    /// Capture job directory
    pub fn capture_dir(&self) -> PathBuf {
        self.data_dir.join(CAPTURE_SUBDIR)
    }

    /// Calibration job directory
    pub fn calibration_dir(&self) -> PathBuf {
        self.data_dir.join(CALIBRATION_SUBDIR)
    }

    /// Public URL of the calibration job directory
    pub fn calibration_url_prefix(&self) -> String {
        format!("{}/{}", self.data_url_prefix, CALIBRATION_SUBDIR)
    }

    /// Public URL of a file directly below `data_dir`
    pub fn data_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.data_url_prefix, file_name)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid {}='{}': {}", key, value, e)))
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// CaptureOrchestrator (multi-camera capture cycles)
    pub capture: Arc<CaptureOrchestrator>,
    /// CalibrationJob (archive intake and calibration)
    pub calibration: Arc<CalibrationJob>,
}

impl AppState {
    /// Build every component from `config`
    pub async fn new(config: AppConfig) -> Result<Self> {
        let controller =
            camera_controller::build_controller(config.camera_controller, config.mock_camera_count);
        let capture = CaptureOrchestrator::new(
            config.capture_dir(),
            &config.status_file,
            controller,
            config.capture,
        )
        .await?;

        let calibrator: Arc<dyn Calibrator> = match config.calibrator {
            CalibratorKind::Command => Arc::new(CommandCalibrator::new(
                config.calibration_command.clone(),
                config.calibration_timeout,
            )),
            CalibratorKind::Mock => Arc::new(MockCalibrator::new()),
        };
        let calibration = CalibrationJob::new(
            config.calibration_dir(),
            &config.status_file,
            config.calibration_url_prefix(),
            Arc::new(ZipExtractor::new()),
            calibrator,
        )?;

        Ok(Self {
            config,
            capture: Arc::new(capture),
            calibration: Arc::new(calibration),
        })
    }
}
