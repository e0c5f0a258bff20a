//! Error handling for the Decapod capture/calibration server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// User-visible message for archives without enough stereo pairs
pub const NO_STEREO_IMAGES_MESSAGE: &str = "Selected archive does not appear to have stereo images.";

/// Abstract outcome category consumed by the transport layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Another operation is in flight, or the state forbids the request
    Conflict,
    /// Caller-supplied input was rejected
    Validation,
    /// Requested resource does not exist
    NotFound,
    /// Server-side failure
    Failure,
}

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Status file could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Camera layer did not finish the capture in time
    #[error("Capture timeout: {0}")]
    CaptureTimeout(String),

    /// Camera layer reported a capture failure
    #[error("Capture error: {0}")]
    Capture(String),

    /// Extracted image set has fewer stereo pairs than required
    #[error("{msg} Found {found} stereo pairs, {required} required", msg = NO_STEREO_IMAGES_MESSAGE)]
    InsufficientStereoImages { found: usize, required: usize },

    /// No extracted image set exists
    #[error("{msg}", msg = NO_STEREO_IMAGES_MESSAGE)]
    NoStereoImages,

    /// Admission control: another operation owns the job
    #[error("Job busy: {0}")]
    JobBusy(String),

    /// Uploaded archive could not be unpacked
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    /// State machine refused the transition
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// External calibration routine failed
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Abstract category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::JobBusy(_) | Error::InvalidTransition(_) => ErrorCategory::Conflict,
            Error::InsufficientStereoImages { .. } | Error::InvalidArchive(_) => {
                ErrorCategory::Validation
            }
            Error::NoStereoImages | Error::NotFound(_) => ErrorCategory::NotFound,
            Error::Persistence(_)
            | Error::CaptureTimeout(_)
            | Error::Capture(_)
            | Error::Calibration(_)
            | Error::Config(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Internal(_) => ErrorCategory::Failure,
        }
    }

    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Persistence(_) => "PERSISTENCE_ERROR",
            Error::CaptureTimeout(_) => "CAPTURE_TIMEOUT",
            Error::Capture(_) => "CAPTURE_ERROR",
            Error::InsufficientStereoImages { .. } | Error::NoStereoImages => "NO_STEREO_IMAGES",
            Error::JobBusy(_) => "JOB_BUSY",
            Error::InvalidArchive(_) => "INVALID_ARCHIVE",
            Error::InvalidTransition(_) => "INVALID_TRANSITION",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Calibration(_) => "CALIBRATION_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::CaptureTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Capture(_) => StatusCode::BAD_GATEWAY,
            _ => match self.category() {
                ErrorCategory::Conflict => StatusCode::CONFLICT,
                ErrorCategory::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCategory::NotFound => StatusCode::NOT_FOUND,
                ErrorCategory::Failure => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        match self.category() {
            ErrorCategory::Failure => tracing::error!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request error"
            ),
            _ => tracing::warn!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request rejected"
            ),
        }

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
