//! Prometheus metrics.
//!
//! Metrics are recorded through the `metrics` facade where they happen
//! (queue, lock backend, coordinator, processor, errors). This module
//! installs the Prometheus recorder and describes every series.
//!
//! | Name | Kind | Labels |
//! |------|------|--------|
//! | `lockstep_queue_depth` | gauge | |
//! | `lockstep_lock_acquire_total` | counter | `outcome` |
//! | `lockstep_lock_acquire_seconds` | histogram | |
//! | `lockstep_jobs_total` | counter | `outcome` |
//! | `lockstep_job_duration_seconds` | histogram | |
//! | `lockstep_errors_total` | counter | `code`, `category`, `retryable` |

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::HashMap;

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Histogram buckets for durations (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,

    /// Global labels to add to all metrics
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            duration_buckets: default_duration_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_duration_buckets() -> Vec<f64> {
    vec![
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
    ]
}

/// Build a Prometheus builder from configuration without installing it.
pub fn prometheus_builder(config: &MetricsConfig) -> anyhow::Result<PrometheusBuilder> {
    let mut builder = PrometheusBuilder::new();
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }
    Ok(builder.set_buckets(&config.duration_buckets)?)
}

/// Install the global Prometheus recorder.
///
/// Returns `None` when metrics are disabled. The handle renders the
/// exposition text served on `/metrics`.
pub fn init_metrics(
    config: &MetricsConfig,
    service_name: &str,
) -> anyhow::Result<Option<PrometheusHandle>> {
    if !config.enabled {
        tracing::info!(service_name = %service_name, "Metrics disabled");
        return Ok(None);
    }

    let handle = prometheus_builder(config)?.install_recorder()?;
    register_metric_descriptions();

    tracing::info!(service_name = %service_name, "Metrics initialized");
    Ok(Some(handle))
}

fn register_metric_descriptions() {
    describe_gauge!("lockstep_queue_depth", "Number of jobs waiting in the work queue");

    describe_counter!(
        "lockstep_lock_acquire_total",
        "Lock acquisition attempts by outcome"
    );
    describe_histogram!(
        "lockstep_lock_acquire_seconds",
        "Time spent acquiring a lease, including retries"
    );

    describe_counter!("lockstep_jobs_total", "Jobs processed by outcome");
    describe_histogram!(
        "lockstep_job_duration_seconds",
        "Time from lock request to job outcome"
    );

    describe_counter!("lockstep_errors_total", "Errors by code and category");
}
