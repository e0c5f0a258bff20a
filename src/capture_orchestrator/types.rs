//! Capture orchestrator type definitions

use crate::camera_controller::MultiCaptureStrategy;
use std::time::Duration;

/// Default upper bound for one capture cycle
pub const DEFAULT_CAPTURE_TIMEOUT_SEC: u64 = 30;

/// Timing and strategy applied to every capture cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Wait before the first camera is triggered
    pub delay: Duration,
    /// Spacing between camera triggers
    pub interval: Duration,
    pub strategy: MultiCaptureStrategy,
    pub timeout: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            interval: Duration::ZERO,
            strategy: MultiCaptureStrategy::default(),
            timeout: Duration::from_secs(DEFAULT_CAPTURE_TIMEOUT_SEC),
        }
    }
}
