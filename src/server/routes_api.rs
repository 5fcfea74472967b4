use crate::ledger::HealthFilter;
use crate::server::{ApiError, AppContext};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use omniscan_common::{JobId, JobStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .route("/files", get(list_files))
        .route("/files/stats", get(file_stats))
        .route("/scan", post(trigger_scan))
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id/cancel", post(cancel_job))
        .route("/pending", get(pending_buckets))
        .route("/sessions", get(list_sessions))
}

async fn list_files(
    State(ctx): State<AppContext>,
    Query(filter): Query<HealthFilter>,
) -> impl IntoResponse {
    Json(ctx.scheduler.query_health(&filter))
}

async fn file_stats(State(ctx): State<AppContext>) -> impl IntoResponse {
    let counts = ctx.scheduler.health_counts();
    Json(serde_json::json!({
        "counts": counts,
        "corrupt": counts.corrupt(),
        "running_jobs": ctx.scheduler.jobs().iter().filter(|j| j.status == JobStatus::Running).count(),
    }))
}

#[derive(Deserialize)]
struct ScanRequest {
    path: String,
}

#[derive(Serialize)]
struct ScanResponse {
    job_id: JobId,
    target: PathBuf,
    status: JobStatus,
}

async fn trigger_scan(
    State(ctx): State<AppContext>,
    Json(payload): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, ApiError> {
    let path = payload.path.trim();
    if path.is_empty() {
        return Err(ApiError::bad_request("invalid_path", "Path cannot be empty"));
    }

    let handle = ctx
        .scheduler
        .trigger_manual_scan(std::path::Path::new(path))
        .await?;

    Ok(Json(ScanResponse {
        job_id: handle.id,
        status: handle.status(),
        target: handle.target,
    }))
}

#[derive(Deserialize)]
struct ListJobsQuery {
    status: Option<JobStatus>,
    limit: Option<usize>,
}

async fn list_jobs(
    State(ctx): State<AppContext>,
    Query(params): Query<ListJobsQuery>,
) -> impl IntoResponse {
    let mut jobs = ctx.scheduler.jobs();

    if let Some(status) = params.status {
        jobs.retain(|j| j.status == status);
    }
    jobs.truncate(params.limit.unwrap_or(100));

    Json(jobs)
}

async fn cancel_job(
    State(ctx): State<AppContext>,
    Path(id): Path<JobId>,
) -> Result<impl IntoResponse, ApiError> {
    let status = ctx.scheduler.cancel_job(id)?;
    tracing::info!(job_id = %id, %status, "job cancelled via API");
    Ok(Json(serde_json::json!({
        "job_id": id,
        "status": status,
    })))
}

async fn pending_buckets(State(ctx): State<AppContext>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(ctx.scheduler.pending_buckets().await?))
}

#[derive(Deserialize)]
struct SessionsQuery {
    limit: Option<usize>,
}

async fn list_sessions(
    State(ctx): State<AppContext>,
    Query(params): Query<SessionsQuery>,
) -> impl IntoResponse {
    Json(ctx.scheduler.history(params.limit))
}
