//! Shared models and types
//!
//! This module contains types shared across multiple modules
//! to avoid circular dependencies.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Calibration job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Ready,
    InProgress,
    Complete,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Ready
    }
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Ready => "READY",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Complete => "COMPLETE",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted status record
///
/// Written as a flat JSON object. Every field is optional on disk so a
/// hand-written `{"status": "IN_PROGRESS"}` still loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDocument {
    /// Calibration status (absent for capture documents)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    /// Next capture cycle number
    #[serde(default)]
    pub index: u64,
    /// Frames captured across all cameras and cycles
    #[serde(default, rename = "totalCaptures")]
    pub total_captures: u64,
    /// Packaged deliverable, only while COMPLETE
    #[serde(default, rename = "resultURL", skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
}

impl StatusDocument {
    /// Initial capture document: `{index: 0, totalCaptures: 0}`
    pub fn initial_capture() -> Self {
        Self::default()
    }

    /// Initial calibration document: `{status: READY, index: 0, totalCaptures: 0}`
    pub fn initial_calibration() -> Self {
        Self {
            status: Some(JobStatus::Ready),
            ..Self::default()
        }
    }

    /// Calibration status, READY when the field is absent
    pub fn job_status(&self) -> JobStatus {
        self.status.unwrap_or_default()
    }
}

/// A single staged field update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    Status(JobStatus),
    Index(u64),
    TotalCaptures(u64),
    ResultUrl(Option<String>),
}

/// Capture cycle response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub images: Vec<PathBuf>,
    #[serde(flatten)]
    pub status: StatusDocument,
}

/// Stereo image count response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StereoImagesResponse {
    #[serde(rename = "numOfStereoImages")]
    pub num_of_stereo_images: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub camera_controller: String,
    pub cameras_connected: usize,
}
