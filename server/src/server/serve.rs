//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::OtaError;
use crate::server::handlers::{
    cancel_job_handler, create_job_handler, health_handler, job_status_handler,
    list_firmware_handler, register_firmware_handler, version_handler,
};
use crate::server::state::ServerState;

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), OtaError>>, OtaError> {
    let app = Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Firmware registry
        .route("/firmware/versions", get(list_firmware_handler))
        .route("/firmware/versions", post(register_firmware_handler))
        // OTA jobs
        .route("/ota/jobs", post(create_job_handler))
        .route("/ota/jobs/{job_id}", get(job_status_handler))
        .route("/ota/jobs/{job_id}", delete(cancel_job_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| OtaError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| OtaError::ServerError(e.to_string()))
    });

    Ok(handle)
}
