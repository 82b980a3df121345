//! Telemetry: structured logging and Prometheus metrics.
//!
//! # Example
//!
//! ```rust,no_run
//! use lockstep_core::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::default();
//! let metrics = init_telemetry(&config).expect("Failed to initialize telemetry");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use self::metrics::{init_metrics, prometheus_builder, MetricsConfig};

use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;

/// Unified telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Service name for identification in logs and metrics
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "lockstep".to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

/// Initialize logging, then metrics.
///
/// Returns the Prometheus handle when metrics are enabled.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<Option<PrometheusHandle>> {
    init_logging(&config.logging, &config.environment)?;
    let handle = init_metrics(&config.metrics, &config.service_name)?;

    tracing::info!(
        service_name = %config.service_name,
        environment = %config.environment,
        format = ?config.logging.format,
        "Telemetry initialized"
    );

    Ok(handle)
}
