//! # Jobs API Handlers
//!
//! Operator view of the registered maintenance jobs, plus manual triggering.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ErrorType, conflict, not_found};
use crate::scheduler::{JobSummary, SchedulerError};
use crate::server::AppState;

/// Response for listing jobs
#[derive(Debug, Serialize, ToSchema)]
pub struct JobsResponse {
    pub jobs: Vec<JobSummary>,
}

/// Response for an accepted manual run
#[derive(Debug, Serialize, ToSchema)]
pub struct RunAccepted {
    #[schema(example = "media_scan")]
    pub job: String,
    pub run_id: Uuid,
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match &err {
            SchedulerError::UnknownJob(name) => {
                not_found(&format!("No job named '{name}'"))
            }
            SchedulerError::AlreadyRunning(name) => {
                conflict(&format!("Job '{name}' is already running"))
                    .with_details(serde_json::json!({ "job": name }))
            }
            SchedulerError::DuplicateJob(_) => {
                tracing::error!(error = %err, "Unexpected scheduler error");
                ErrorType::InternalServerError.into()
            }
        }
    }
}

/// List registered jobs with their trigger, state and last outcome
#[utoipa::path(
    get,
    path = "/jobs",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Registered jobs", body = JobsResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn list_jobs(State(state): State<AppState>) -> Json<JobsResponse> {
    Json(JobsResponse {
        jobs: state.scheduler.jobs(),
    })
}

/// Run a job immediately, outside its schedule
#[utoipa::path(
    post,
    path = "/jobs/{name}/run",
    security(("bearer_auth" = [])),
    params(
        ("name" = String, Path, description = "Job name, e.g. media_scan")
    ),
    responses(
        (status = 202, description = "Run started", body = RunAccepted),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Unknown job", body = ApiError),
        (status = 409, description = "Job already running", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn run_job(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    let handle = state.scheduler.trigger_now(&name)?;
    tracing::info!(job = %name, run_id = %handle.run_id, "Manual job run accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            job: name,
            run_id: handle.run_id,
        }),
    ))
}
