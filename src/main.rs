//! Decapod Server - stereo capture and calibration service
//!
//! Main entry point for the server application.

use decapod_server::{
    state::{AppConfig, AppState},
    web_api,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "decapod_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Decapod Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        data_url_prefix = %config.data_url_prefix,
        camera_controller = ?config.camera_controller,
        multi_capture = ?config.capture.strategy,
        calibrator = ?config.calibrator,
        "Configuration loaded"
    );

    tokio::fs::create_dir_all(&config.data_dir).await?;

    // Build capture and calibration components
    let state = AppState::new(config).await?;
    tracing::info!(
        cameras = state.capture.ports().len(),
        calibration_status = %state.calibration.get_status().job_status(),
        "Components initialized"
    );

    // Results and exports are served as static files
    let serve_dir = ServeDir::new(&state.config.data_dir);

    let app = web_api::create_router(state.clone())
        .nest_service(&state.config.data_url_prefix, serve_dir)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    tracing::info!(
        data_dir = %state.config.data_dir.display(),
        prefix = %state.config.data_url_prefix,
        "Static data serving enabled"
    );

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
