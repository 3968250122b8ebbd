use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use comarca_core::{
    Execution, ExecutionFault, ExecutionStatus, JobFilter, JobId, JobStatus,
    ScrapeJob, ScrapeOptions, ScrapeType,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    errors::{ApiError, ApiResponse},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub scrape_type: ScrapeType,
    pub targets: Vec<String>,
    #[serde(default)]
    pub options: ScrapeOptions,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<JobStatus>,
    pub scrape_type: Option<ScrapeType>,
}

#[derive(Debug, Serialize)]
pub struct ExecutionDto {
    pub id: Uuid,
    pub tribunal: String,
    pub tribunal_name: String,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<ExecutionFault>,
}

impl From<&Execution> for ExecutionDto {
    fn from(execution: &Execution) -> Self {
        Self {
            id: execution.id.0,
            tribunal: execution.tribunal.id.to_string(),
            tribunal_name: execution.tribunal.name.clone(),
            status: execution.status,
            started_at: execution.started_at,
            finished_at: execution.finished_at,
            result_count: execution.result_count,
            fault: execution.fault.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobSummaryDto {
    pub id: Uuid,
    pub scrape_type: ScrapeType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub total_targets: usize,
    pub completed_targets: usize,
}

impl From<&ScrapeJob> for JobSummaryDto {
    fn from(job: &ScrapeJob) -> Self {
        Self {
            id: job.id.0,
            scrape_type: job.scrape_type,
            status: job.status,
            created_at: job.created_at,
            total_targets: job.executions.len(),
            completed_targets: job
                .executions
                .iter()
                .filter(|e| e.status == ExecutionStatus::Completed)
                .count(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobDetailDto {
    #[serde(flatten)]
    pub summary: JobSummaryDto,
    pub executions: Vec<ExecutionDto>,
}

impl From<&ScrapeJob> for JobDetailDto {
    fn from(job: &ScrapeJob) -> Self {
        Self {
            summary: JobSummaryDto::from(job),
            executions: job.executions.iter().map(ExecutionDto::from).collect(),
        }
    }
}

pub async fn create_job_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .orchestrator
        .create_job(request.scrape_type, &request.targets, request.options)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(JobDetailDto::from(&job))),
    ))
}

pub async fn list_jobs_handler(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<ApiResponse<Vec<JobSummaryDto>>>, ApiError> {
    let jobs = state
        .store
        .list_jobs(JobFilter {
            status: query.status,
            scrape_type: query.scrape_type,
        })
        .await?;
    let summaries = jobs.iter().map(JobSummaryDto::from).collect();
    Ok(Json(ApiResponse::success(summaries)))
}

pub async fn get_job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<JobDetailDto>>, ApiError> {
    let job = state
        .store
        .fetch_job(JobId(job_id))
        .await?
        .ok_or_else(|| ApiError {
            status: StatusCode::NOT_FOUND,
            message: format!("job {job_id} not found"),
        })?;
    Ok(Json(ApiResponse::success(JobDetailDto::from(&job))))
}
