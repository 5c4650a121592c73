use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use rand::Rng;

use super::ApiError;
use crate::app_state::AppState;
use crate::db::StoreError;
use crate::models::api::{JobStatusResponse, StatusQuery, StoreErrorInfo, SubmitRequest, SubmitResponse};
use crate::models::job::{JobStatus, JobSubmission};
use crate::services::queue::publish_job;

const JOB_ID_ATTEMPTS: usize = 5;

/// POST /api/submit: accept a batch of store visits as one job.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if request.count != request.visits.len() {
        return Err(ApiError::BadRequest(
            "count and number of objects in visits array should be equal".to_string(),
        ));
    }

    let job_id = allocate_job_id(&state).await?;

    // Created must land before the message is visible to workers.
    state.store.upsert_status(job_id, JobStatus::Created).await?;

    let job = JobSubmission {
        job_id,
        store_jobs: request.visits,
    };
    publish_job(state.queue.as_ref(), &job).await?;

    metrics::counter!("jobs_submitted_total").increment(1);
    tracing::info!(
        job_id,
        stores = job.store_jobs.len(),
        images = job.image_count(),
        "Job submitted"
    );

    Ok((StatusCode::CREATED, Json(SubmitResponse { job_id })))
}

/// Random 7-digit id not already present in the job status table.
async fn allocate_job_id(state: &AppState) -> Result<i64, ApiError> {
    for _ in 0..JOB_ID_ATTEMPTS {
        let candidate = rand::thread_rng().gen_range(1_000_000..=9_999_999);
        match state.store.get_status(candidate).await {
            Err(StoreError::NotFound(_)) => return Ok(candidate),
            Ok(_) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::Unavailable(
        "could not allocate a job id, retry the submission".to_string(),
    ))
}

/// GET /api/status?jobid=N: job status, with per-store errors for failed jobs.
pub async fn get_job_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let raw = query.jobid.as_deref().map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(ApiError::BadRequest("jobid is required".to_string()));
    }
    let job_id: i64 = raw
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid job id '{}'", raw)))?;

    let status = state.store.get_status(job_id).await?;

    let error = if status == JobStatus::Failed {
        state
            .store
            .get_errors(job_id)
            .await?
            .into_iter()
            .map(|e| StoreErrorInfo {
                store_id: e.store_id,
                error: e.error,
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(Json(JobStatusResponse {
        status: status.to_string(),
        job_id,
        error,
    }))
}
