//! Handlers for starting propagation jobs and reading their status.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use segflow_core::error::CoreError;
use segflow_core::progress::{JobStatus, ProgressSnapshot};
use segflow_core::types::{JobId, ProjectId, Timestamp};
use segflow_pipeline::StartedJob;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Optional body of a start request. An absent or empty body means
/// "use the configured defaults".
#[derive(Debug, Default, Deserialize, Validate)]
pub struct StartPropagationRequest {
    /// Overrides how far one source frame may reach.
    #[validate(range(min = 1))]
    pub max_propagation_length: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PropagationStatusResponse {
    pub job_id: JobId,
    pub project_id: ProjectId,
    pub status: JobStatus,
    /// Latest snapshot; `null` until the job starts running.
    pub progress: Option<ProgressSnapshot>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// POST /projects/{project_id}/propagate
// ---------------------------------------------------------------------------

/// Plan a propagation job and start it in the background.
///
/// Returns as soon as the job is queued; progress is read from the status
/// endpoint or the progress stream.
pub async fn start_propagation(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    body: Bytes,
) -> AppResult<Json<StartedJob>> {
    let request = parse_start_request(&body)?;
    request.validate()?;

    let started = state
        .orchestrator
        .start(project_id, request.max_propagation_length)
        .await?;

    Ok(Json(started))
}

fn parse_start_request(body: &[u8]) -> AppResult<StartPropagationRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(StartPropagationRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))
}

// ---------------------------------------------------------------------------
// GET /projects/{project_id}/propagate/{job_id}
// ---------------------------------------------------------------------------

/// Current status of a job. Jobs of other projects are reported as missing.
pub async fn get_propagation_status(
    State(state): State<AppState>,
    Path((project_id, job_id)): Path<(ProjectId, String)>,
) -> AppResult<Json<PropagationStatusResponse>> {
    let job = state
        .orchestrator
        .job(&job_id)
        .await
        .filter(|job| job.project_id == project_id)
        .ok_or_else(|| CoreError::not_found("Propagation job", &job_id))?;

    Ok(Json(PropagationStatusResponse {
        status: job.status(),
        started_at: job.state.started_at(),
        completed_at: job.state.completed_at(),
        progress: job.progress,
        job_id: job.job_id,
        project_id: job.project_id,
    }))
}
