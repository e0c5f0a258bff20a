//! API Routes

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::capture_orchestrator::EXPORT_FILE_NAME;
use crate::models::{CaptureResponse, StereoImagesResponse};
use crate::state::AppState;

/// Largest accepted calibration archive
const MAX_ARCHIVE_BYTES: usize = 512 * 1024 * 1024;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Cameras
        .route("/api/cameras", get(list_cameras))
        // Capture
        .route(
            "/api/capture",
            get(get_capture_status).post(capture).delete(delete_captures),
        )
        .route("/api/capture/export", get(export_captures))
        .route("/api/capture/:index/images", get(capture_images))
        // Calibration
        .route(
            "/api/calibrate",
            get(get_calibration_status).delete(delete_calibration),
        )
        .route(
            "/api/calibrate/images",
            get(get_stereo_images)
                .put(upload_calibration_images)
                .delete(delete_calibration_images),
        )
        .layer(DefaultBodyLimit::max(MAX_ARCHIVE_BYTES))
        .with_state(state)
}

// ========================================
// Camera / Capture Handlers
// ========================================

async fn list_cameras(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "controller": state.capture.controller_name(),
        "ports": state.capture.ports(),
    }))
}

async fn get_capture_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.capture.get_status())
}

/// Run one capture cycle
async fn capture(State(state): State<AppState>) -> Result<impl IntoResponse, crate::Error> {
    let images = state.capture.capture_cycle().await?;
    Ok(Json(CaptureResponse {
        images,
        status: state.capture.get_status(),
    }))
}

async fn capture_images(
    State(state): State<AppState>,
    Path(index): Path<u64>,
) -> Result<impl IntoResponse, crate::Error> {
    let images = state.capture.images_by_index(index).await?;
    if images.is_empty() {
        return Err(crate::Error::NotFound(format!("No images for capture {}", index)));
    }
    Ok(Json(json!({ "index": index, "images": images })))
}

/// Zip all captures for download
async fn export_captures(State(state): State<AppState>) -> Result<impl IntoResponse, crate::Error> {
    state.capture.export().await?;
    Ok(Json(json!({ "url": state.config.data_url(EXPORT_FILE_NAME) })))
}

async fn delete_captures(State(state): State<AppState>) -> Result<impl IntoResponse, crate::Error> {
    state.capture.delete().await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========================================
// Calibration Handlers
// ========================================

async fn get_calibration_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.calibration.get_status())
}

async fn delete_calibration(State(state): State<AppState>) -> Result<impl IntoResponse, crate::Error> {
    state.calibration.delete().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_stereo_images(State(state): State<AppState>) -> Result<impl IntoResponse, crate::Error> {
    let count = state.calibration.num_of_stereo_images().await?;
    Ok(Json(StereoImagesResponse {
        num_of_stereo_images: count,
    }))
}

/// Accept a zip of stereo images and start calibrating
async fn upload_calibration_images(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, crate::Error> {
    let status = state.calibration.submit_archive(body.to_vec()).await?;
    Ok((StatusCode::ACCEPTED, Json(status)))
}

async fn delete_calibration_images(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, crate::Error> {
    state.calibration.delete_images().await?;
    Ok(StatusCode::NO_CONTENT)
}
