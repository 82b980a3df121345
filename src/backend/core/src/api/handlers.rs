//! HTTP handlers.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, AppState};
use crate::error::LockstepError;
use crate::jobs::{JobState, ProcessorReport, ProcessorState};

// ═══════════════════════════════════════════════════════════════════════════════
// Health Check
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub queue_depth: usize,
    pub processor: ProcessorReport,
    pub timestamp: String,
}

/// 200 while the processor loop runs (or has yet to start), 503 once stopped.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let processor = state.processor.report();
    let (code, status) = match processor.state {
        ProcessorState::Running => (StatusCode::OK, "healthy"),
        ProcessorState::Idle => (StatusCode::OK, "starting"),
        ProcessorState::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "stopped"),
    };

    let report = HealthReport {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        queue_depth: state.processor.queue().len(),
        processor,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    (code, Json(report))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Handlers
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct JobFilter {
    pub state: Option<String>,
}

/// An unknown `state` answers 422 rather than an empty list.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(filter): Query<JobFilter>,
) -> Result<impl IntoResponse, LockstepError> {
    let wanted = filter.state.as_deref().map(str::parse::<JobState>).transpose()?;
    let mut jobs = state.processor.tracker().get_all();
    if let Some(wanted) = wanted {
        jobs.retain(|job| job.state == wanted);
    }
    Ok(Json(ApiResponse::success(jobs)))
}

pub async fn job_summary(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.processor.tracker().summary()))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, LockstepError> {
    let status = state
        .processor
        .tracker()
        .get(&id)
        .ok_or_else(|| LockstepError::job_not_found(&id))?;
    Ok(Json(ApiResponse::success(status)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
