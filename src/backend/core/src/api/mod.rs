//! Read-only HTTP status surface.
//!
//! | Route | Body |
//! |-------|------|
//! | `GET /health` | processor state and queue depth |
//! | `GET /jobs` | every tracked [`JobStatus`](crate::jobs::JobStatus) |
//! | `GET /jobs/summary` | per-state counts |
//! | `GET /jobs/:id` | one job, or 404 |
//! | `GET /metrics` | Prometheus exposition text |
//!
//! Jobs carry code, so there is no submission endpoint.

mod handlers;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::jobs::JobProcessor;

pub use handlers::HealthReport;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<JobProcessor>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(processor: Arc<JobProcessor>) -> Self {
        Self {
            processor,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Standard envelope for JSON responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Build the status router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/summary", get(handlers::job_summary))
        .route("/jobs/:id", get(handlers::get_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
