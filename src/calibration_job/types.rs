//! Calibration job type definitions

use crate::error::{Error, Result};
use crate::models::JobStatus;

/// Stereo pairs an archive must contain before calibration starts
pub const REQUIRED_STEREO_IMAGES: usize = 10;

pub const ACCEPT_BUSY_MESSAGE: &str =
    "Calibration currently in progress, cannot accept another zip until this process has finished";
pub const DELETE_BUSY_MESSAGE: &str =
    "Calibration in progress, cannot delete until this process has finished";

/// Inputs to the calibration state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationEvent {
    /// A validated archive was accepted for calibration
    ArchiveAccepted,
    CalibrationCompleted,
    CalibrationFailed,
    Delete,
}

impl JobStatus {
    /// Next status for `event`, or the refusal
    pub fn transition(self, event: CalibrationEvent) -> Result<JobStatus> {
        use CalibrationEvent::*;
        use JobStatus::*;

        match (self, event) {
            (Ready | Complete, ArchiveAccepted) => Ok(InProgress),
            (InProgress, ArchiveAccepted) => Err(Error::JobBusy(ACCEPT_BUSY_MESSAGE.to_string())),
            (InProgress, CalibrationCompleted) => Ok(Complete),
            (InProgress, CalibrationFailed) => Ok(Ready),
            (Ready | Complete, CalibrationCompleted | CalibrationFailed) => Err(
                Error::InvalidTransition(format!("{:?} is not valid while {}", event, self)),
            ),
            (Ready | Complete, Delete) => Ok(Ready),
            (InProgress, Delete) => Err(Error::JobBusy(DELETE_BUSY_MESSAGE.to_string())),
        }
    }
}
