//! Configuration management.
//!
//! Sources, later ones winning:
//!
//! 1. Built-in defaults
//! 2. A config file (`toml`, `yaml` or `json`, chosen by extension)
//! 3. Environment variables prefixed `LOCKSTEP_`, nested with `__`
//!    (`LOCKSTEP_LOCK__EXPIRY=45s`, `LOCKSTEP_LOCK__ENDPOINTS=redis://a,redis://b`)
//!
//! Durations use humantime syntax (`30s`, `100ms`, `1m 30s`).

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LockstepError, Result};
use crate::jobs::{JobProcessor, ProcessorConfig, StatusTracker, WorkQueue};
use crate::lock::quorum::MAX_CLOCK_DRIFT_FACTOR;
use crate::lock::{LockBackend, LockCoordinator, LockOptions};
use crate::telemetry::TelemetryConfig;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Lock servers and lease timings
    #[serde(default)]
    pub lock: LockConfig,

    /// Job processor loop
    #[serde(default)]
    pub processor: ProcessorSettings,

    /// Status HTTP server
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging and metrics
    #[serde(default)]
    pub observability: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    /// Lock server URLs; a lease needs a majority of them
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Lease lifetime and execution deadline
    #[serde(default = "default_expiry", with = "humantime_serde")]
    pub expiry: Duration,

    /// Maximum time spent acquiring a lease
    #[serde(default = "default_wait_timeout", with = "humantime_serde")]
    pub wait_timeout: Duration,

    /// Pause between acquisition attempts
    #[serde(default = "default_retry_interval", with = "humantime_serde")]
    pub retry_interval: Duration,

    /// Budget for a single node call
    #[serde(default = "default_node_timeout", with = "humantime_serde")]
    pub node_timeout: Duration,

    /// Clock drift allowance as a fraction of `expiry`
    #[serde(default = "default_clock_drift_factor")]
    pub clock_drift_factor: f64,

    /// Abort a job that outlives its lease instead of leaving it running
    #[serde(default)]
    pub abort_on_expiry: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            expiry: default_expiry(),
            wait_timeout: default_wait_timeout(),
            retry_interval: default_retry_interval(),
            node_timeout: default_node_timeout(),
            clock_drift_factor: default_clock_drift_factor(),
            abort_on_expiry: false,
        }
    }
}

impl LockConfig {
    /// Lease timings for the coordinator.
    pub fn options(&self) -> LockOptions {
        LockOptions {
            expiry: self.expiry,
            wait_timeout: self.wait_timeout,
            retry_interval: self.retry_interval,
            abort_on_expiry: self.abort_on_expiry,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorSettings {
    /// Processor name used in logs
    #[serde(default = "default_processor_name")]
    pub name: String,

    /// Sleep between queue polls
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Prefix joined to job ids to name their lock
    #[serde(default = "default_resource_prefix")]
    pub resource_prefix: String,

    /// Enqueue the built-in maintenance jobs
    #[serde(default = "default_true")]
    pub builtin_jobs: bool,

    /// How often the built-in jobs are enqueued
    #[serde(default = "default_builtin_interval", with = "humantime_serde")]
    pub builtin_interval: Duration,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            name: default_processor_name(),
            poll_interval: default_poll_interval(),
            resource_prefix: default_resource_prefix(),
            builtin_jobs: true,
            builtin_interval: default_builtin_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Default value functions
fn default_endpoints() -> Vec<String> {
    vec![
        "redis://localhost:6379".to_string(),
        "redis://localhost:6380".to_string(),
        "redis://localhost:6381".to_string(),
    ]
}
fn default_expiry() -> Duration { Duration::from_secs(30) }
fn default_wait_timeout() -> Duration { Duration::from_secs(5) }
fn default_retry_interval() -> Duration { Duration::from_millis(100) }
fn default_node_timeout() -> Duration { Duration::from_millis(50) }
fn default_clock_drift_factor() -> f64 { 0.01 }
fn default_processor_name() -> String { "lockstep-processor".to_string() }
fn default_poll_interval() -> Duration { Duration::from_secs(1) }
fn default_resource_prefix() -> String { "job:".to_string() }
fn default_builtin_interval() -> Duration { Duration::from_secs(60) }
fn default_true() -> bool { true }
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }

fn environment() -> config::Environment {
    config::Environment::with_prefix("LOCKSTEP")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("lock.endpoints")
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(environment())
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load configuration from a file, with environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Processor settings combined with lease timings.
    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            name: self.processor.name.clone(),
            poll_interval: self.processor.poll_interval,
            resource_prefix: self.processor.resource_prefix.clone(),
            lock: self.lock.options(),
        }
    }

    /// Wire a processor over `backend` with a fresh queue and tracker.
    pub fn build_processor(&self, backend: Arc<dyn LockBackend>) -> Arc<JobProcessor> {
        let coordinator = Arc::new(LockCoordinator::new(backend, self.lock.options()));
        Arc::new(JobProcessor::new(
            Arc::new(WorkQueue::new()),
            coordinator,
            Arc::new(StatusTracker::new()),
            self.processor_config(),
        ))
    }

    /// Reject settings the lock algorithm cannot work with.
    pub fn validate(&self) -> Result<()> {
        let lock = &self.lock;
        if lock.endpoints.is_empty() {
            return Err(LockstepError::invalid_configuration(
                "lock.endpoints must list at least one server",
            ));
        }
        if lock.expiry.is_zero() {
            return Err(LockstepError::invalid_configuration("lock.expiry must be positive"));
        }
        if lock.wait_timeout.is_zero() {
            return Err(LockstepError::invalid_configuration(
                "lock.wait_timeout must be positive",
            ));
        }
        if lock.retry_interval.is_zero() {
            return Err(LockstepError::invalid_configuration(
                "lock.retry_interval must be positive",
            ));
        }
        if lock.node_timeout.is_zero() || lock.node_timeout >= lock.expiry {
            return Err(LockstepError::invalid_configuration(
                "lock.node_timeout must be positive and shorter than lock.expiry",
            ));
        }
        if !(0.0..=MAX_CLOCK_DRIFT_FACTOR).contains(&lock.clock_drift_factor) {
            return Err(LockstepError::invalid_configuration(format!(
                "lock.clock_drift_factor must be in [0, {}]",
                MAX_CLOCK_DRIFT_FACTOR
            )));
        }
        if self.processor.poll_interval.is_zero() {
            return Err(LockstepError::invalid_configuration(
                "processor.poll_interval must be positive",
            ));
        }
        if self.processor.builtin_jobs && self.processor.builtin_interval.is_zero() {
            return Err(LockstepError::invalid_configuration(
                "processor.builtin_interval must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.lock.endpoints.len(), 3);
        assert_eq!(config.lock.expiry, Duration::from_secs(30));
        assert_eq!(config.lock.wait_timeout, Duration::from_secs(5));
        assert_eq!(config.lock.retry_interval, Duration::from_millis(100));
        assert_eq!(config.processor.poll_interval, Duration::from_secs(1));
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
        config.validate().unwrap();
    }

    #[test]
    fn test_lock_options_follow_config() {
        let mut config = Config::default();
        config.lock.expiry = Duration::from_secs(10);
        config.lock.abort_on_expiry = true;

        let processor = config.processor_config();
        assert_eq!(processor.lock.expiry, Duration::from_secs(10));
        assert!(processor.lock.abort_on_expiry);
        assert_eq!(processor.resource_prefix, "job:");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.lock.endpoints.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.lock.node_timeout = Duration::from_secs(60);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.lock.clock_drift_factor = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.lock.wait_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.lock.clock_drift_factor = -0.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.processor.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.processor.builtin_interval = Duration::ZERO;
        assert!(config.validate().is_err());
        config.processor.builtin_jobs = false;
        config.validate().unwrap();
    }

    #[test]
    fn test_builtin_defaults() {
        let config = Config::default();
        assert!(config.processor.builtin_jobs);
        assert_eq!(config.processor.builtin_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_build_processor_uses_config() {
        let mut config = Config::default();
        config.processor.name = "billing".into();
        config.lock.expiry = Duration::from_secs(12);

        let processor =
            config.build_processor(Arc::new(crate::lock::QuorumLockBackend::in_memory(3)));
        assert_eq!(processor.config().name, "billing");
        assert_eq!(processor.coordinator().defaults().expiry, Duration::from_secs(12));
        assert!(processor.queue().is_empty());
        assert!(processor.tracker().is_empty());
    }

    #[test]
    fn test_humantime_durations() {
        let lock: LockConfig =
            serde_json::from_str(r#"{"expiry":"45s","retry_interval":"250ms"}"#).unwrap();
        assert_eq!(lock.expiry, Duration::from_secs(45));
        assert_eq!(lock.retry_interval, Duration::from_millis(250));
        assert_eq!(lock.wait_timeout, Duration::from_secs(5));
    }
}
