//! Handlers for the `/jobs` resource.
//!
//! Jobs enter the queue here as `pending`; the worker claims and runs
//! them. A failed or cancelled job is never edited in place: resubmitting
//! it queues a new job linked through `resubmitted_from`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use vigil_core::error::CoreError;
use vigil_core::types::JobId;
use vigil_db::models::job::SubmitJob;
use vigil_db::repositories::JobRepo;

use crate::error::{AppError, AppResult};
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/jobs
///
/// Queue a new job. `input` must be a JSON object.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<SubmitJob>,
) -> AppResult<impl IntoResponse> {
    if !body.input.is_object() {
        return Err(AppError::BadRequest("input must be a JSON object".into()));
    }
    let job = JobRepo::submit(&state.pool, &body).await?;
    tracing::info!(job_id = %job.id, "Job submitted");
    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

/// GET /api/v1/jobs?limit=50&offset=0
///
/// List jobs, newest first.
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> AppResult<impl IntoResponse> {
    let jobs = JobRepo::list(&state.pool, params.limit(), params.offset()).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = JobRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound { entity: "Job", id })?;
    Ok(Json(DataResponse { data: job }))
}

/// PUT /api/v1/jobs/{id}
///
/// Resubmit a failed or cancelled job. Answers `201` with the new job,
/// `409` when the job is in any other status.
pub async fn resubmit(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = JobRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound { entity: "Job", id })?;

    let status = job.job_status()?;
    if !status.is_resubmittable() {
        return Err(CoreError::Conflict(format!(
            "Job {id} is {status}; only failed or cancelled jobs can be resubmitted"
        ))
        .into());
    }

    // The insert re-checks the status, so a concurrent change surfaces here.
    let retry = JobRepo::resubmit(&state.pool, id)
        .await?
        .ok_or_else(|| CoreError::Conflict(format!("Job {id} changed while resubmitting")))?;

    tracing::info!(
        job_id = %id,
        new_job_id = %retry.id,
        previous_error = ?job.job_error(),
        "Job resubmitted"
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: retry })))
}
