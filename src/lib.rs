//! Decapod Server Library
//!
//! Stereo camera capture and calibration service
//!
//! ## Architecture
//!
//! 1. StatusStore - Durable JSON status document per job
//! 2. ChangeNotifier - Batched status updates with ordered listeners
//! 3. CameraController - gphoto2 / mock camera access
//! 4. CaptureOrchestrator - Multi-camera capture cycles
//! 5. CalibrationJob - Archive intake and calibration state machine
//! 6. Archive - Zip intake and result packaging
//! 7. Calibrator - External calibration routine
//! 8. WebAPI - REST API endpoints
//!
//! ## Design Principles
//!
//! - The status file is the single source of truth for job state
//! - One state-changing operation per job at a time; others are refused
//! - Status queries never wait on device or calibration work

pub mod archive;
pub mod calibration_job;
pub mod calibrator;
pub mod camera_controller;
pub mod capture_orchestrator;
pub mod change_notifier;
pub mod error;
pub mod models;
pub mod state;
pub mod status_store;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
