//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::OtaError;
use crate::models::firmware::FirmwareVersion;
use crate::models::job::RolloutConfig;
use crate::registry::RegisterRequest;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Map an error to its HTTP status
fn error_status(err: &OtaError) -> StatusCode {
    match err {
        OtaError::NotFound(_) => StatusCode::NOT_FOUND,
        OtaError::Conflict(_) => StatusCode::CONFLICT,
        OtaError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error payload returned to clients
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(err: OtaError) -> (StatusCode, Json<ErrorResponse>) {
    let status = error_status(&err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "otafleet".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Firmware registration request body
#[derive(Debug, Deserialize)]
pub struct RegisterFirmwareBody {
    pub device_type: String,
    pub version: String,
    pub artifact_location: String,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Register a new firmware version
pub async fn register_firmware_handler(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<RegisterFirmwareBody>,
) -> Result<(StatusCode, Json<FirmwareVersion>), (StatusCode, Json<ErrorResponse>)> {
    let entry = state
        .registry
        .register(RegisterRequest {
            device_type: body.device_type,
            version: body.version,
            artifact_location: body.artifact_location,
            checksum: body.checksum,
            metadata: body.metadata,
        })
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(entry)))
}

/// Firmware listing query parameters
#[derive(Debug, Deserialize)]
pub struct ListFirmwareQuery {
    pub device_type: Option<String>,
}

/// Firmware listing response
#[derive(Debug, Serialize)]
pub struct ListFirmwareResponse {
    pub firmware_versions: Vec<FirmwareVersion>,
    pub count: usize,
}

/// List registered firmware versions
pub async fn list_firmware_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ListFirmwareQuery>,
) -> impl IntoResponse {
    let versions = state.registry.list(query.device_type.as_deref());
    let count = versions.len();
    Json(ListFirmwareResponse {
        firmware_versions: versions,
        count,
    })
}

/// Job creation request body
#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    pub device_targets: Vec<String>,
    pub firmware_version: String,
    pub device_type: String,
    #[serde(default)]
    pub rollout_config: RolloutConfig,
}

/// Create an OTA job and start its workflow
pub async fn create_job_handler(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<CreateJobBody>,
) -> Result<(StatusCode, Json<crate::orchestrator::CreateJobResponse>), (StatusCode, Json<ErrorResponse>)>
{
    let response = state
        .orchestrator
        .create_job(
            &body.device_targets,
            &body.firmware_version,
            &body.device_type,
            body.rollout_config,
        )
        .await
        .map_err(error_response)?;

    // Drive the job to a terminal outcome in the background; the controller
    // holds the job's exclusive execution token for the duration.
    let controller = state.controller.clone();
    let job_id = response.job_id.clone();
    tokio::spawn(async move {
        match controller.resume(&job_id, tokio::time::sleep).await {
            Ok(outcome) => {
                tracing::info!("Workflow for job {} finished: {:?}", job_id, outcome.state)
            }
            Err(e) => error!("Workflow for job {} aborted: {}", job_id, e),
        }
    });

    Ok((StatusCode::CREATED, Json(response)))
}

/// Get job status
pub async fn job_status_handler(
    State(state): State<Arc<ServerState>>,
    Path(job_id): Path<String>,
) -> Result<Json<crate::tracker::JobStatusReport>, (StatusCode, Json<ErrorResponse>)> {
    let report = state
        .tracker
        .get_job_status(&job_id)
        .map_err(error_response)?;
    Ok(Json(report))
}

/// Cancel a job
pub async fn cancel_job_handler(
    State(state): State<Arc<ServerState>>,
    Path(job_id): Path<String>,
) -> Result<Json<crate::tracker::CancelResponse>, (StatusCode, Json<ErrorResponse>)> {
    let response = state
        .tracker
        .cancel_job(&job_id)
        .await
        .map_err(error_response)?;
    Ok(Json(response))
}
