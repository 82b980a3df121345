//! Error handling for lockstep.
//!
//! This module provides:
//! - A single crate error type with a stable, machine-readable code
//! - User-facing messages kept apart from internal detail
//! - HTTP status mapping for the status query surface
//! - Severity-based logging and an error counter
//!
//! Lock outcomes (not acquired, timed out, action failed) are reported as
//! data by [`crate::lock::LockOutcome`]; only fail-fast validation and
//! infrastructure faults surface as [`LockstepError`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

/// A specialized Result type for lockstep operations.
pub type Result<T> = std::result::Result<T, LockstepError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation Errors (1000-1099)
    ValidationError,
    EmptyResource,
    InvalidStateTransition,

    // Lock Errors (1100-1199)
    LockNotAcquired,
    LockBackendUnavailable,
    LockReleaseFailed,

    // Job Errors (1200-1299)
    JobNotFound,
    JobExecutionFailed,
    JobTimedOut,

    // Serialization Errors (2200-2299)
    SerializationError,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    // Internal Errors (9000-9099)
    InternalError,
    UnknownError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::ValidationError => 1000,
            Self::EmptyResource => 1001,
            Self::InvalidStateTransition => 1002,

            Self::LockNotAcquired => 1100,
            Self::LockBackendUnavailable => 1101,
            Self::LockReleaseFailed => 1102,

            Self::JobNotFound => 1200,
            Self::JobExecutionFailed => 1201,
            Self::JobTimedOut => 1202,

            Self::SerializationError => 2200,

            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,
            Self::InvalidConfiguration => 5002,

            Self::InternalError => 9000,
            Self::UnknownError => 9099,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::JobNotFound => StatusCode::NOT_FOUND,

            Self::InvalidStateTransition => StatusCode::CONFLICT,

            Self::ValidationError | Self::EmptyResource => StatusCode::UNPROCESSABLE_ENTITY,

            Self::LockNotAcquired => StatusCode::LOCKED,

            Self::JobTimedOut => StatusCode::GATEWAY_TIMEOUT,

            Self::LockBackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            Self::LockReleaseFailed
            | Self::JobExecutionFailed
            | Self::SerializationError
            | Self::ConfigurationError
            | Self::MissingConfiguration
            | Self::InvalidConfiguration
            | Self::InternalError
            | Self::UnknownError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockNotAcquired | Self::LockBackendUnavailable | Self::JobTimedOut
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "validation",
            1100..=1199 => "lock",
            1200..=1299 => "job",
            2200..=2299 => "serialization",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors (bad input)
    Low,
    /// Operational issues (contention, timeouts)
    Medium,
    /// System errors (backend faults, bad configuration)
    High,
    /// Errors requiring immediate attention
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::ValidationError
            | ErrorCode::EmptyResource
            | ErrorCode::InvalidStateTransition
            | ErrorCode::JobNotFound => Self::Low,

            ErrorCode::LockNotAcquired | ErrorCode::JobTimedOut | ErrorCode::JobExecutionFailed => {
                Self::Medium
            }

            ErrorCode::LockReleaseFailed
            | ErrorCode::SerializationError
            | ErrorCode::ConfigurationError
            | ErrorCode::MissingConfiguration
            | ErrorCode::InvalidConfiguration => Self::High,

            ErrorCode::LockBackendUnavailable
            | ErrorCode::InternalError
            | ErrorCode::UnknownError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for lockstep.
#[derive(Error, Debug)]
pub struct LockstepError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Structured key-value context
    context: HashMap<String, serde_json::Value>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for LockstepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl LockstepError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            context: HashMap::new(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// The resource name passed to a lock call was empty.
    pub fn empty_resource() -> Self {
        Self::new(ErrorCode::EmptyResource, "Resource cannot be empty")
    }

    /// No status entry exists for the job.
    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        let job_id = job_id.into();
        Self::new(ErrorCode::JobNotFound, format!("Job not found: {}", job_id))
            .with_context("job_id", job_id)
    }

    /// A lifecycle transition was requested from a state that does not allow it.
    pub fn invalid_state_transition(from: impl fmt::Debug, to: impl fmt::Debug) -> Self {
        Self::new(
            ErrorCode::InvalidStateTransition,
            format!("Invalid state transition: {:?} -> {:?}", from, to),
        )
    }

    /// A lock server could not be reached or answered with an error.
    pub fn lock_backend(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self::with_internal(
            ErrorCode::LockBackendUnavailable,
            "Lock server unavailable",
            message,
        )
        .with_context("endpoint", endpoint)
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add context.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the structured context.
    pub fn context(&self) -> &HashMap<String, serde_json::Value> {
        &self.context
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::Critical | ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    context = ?self.context,
                    "Lockstep error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Lockstep error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Lockstep error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "lockstep_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "retryable" => self.is_retryable().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error body returned by the HTTP surface.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false for errors
    pub success: bool,

    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code
    pub numeric_code: u32,

    /// User-friendly error message
    pub message: String,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&LockstepError> for ErrorResponse {
    fn from(error: &LockstepError) -> Self {
        Self {
            success: false,
            code: error.code,
            numeric_code: error.code.numeric_code(),
            message: error.user_message.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl IntoResponse for LockstepError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.http_status();
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════════════════

impl From<redis::RedisError> for LockstepError {
    fn from(error: redis::RedisError) -> Self {
        let user_msg = if error.is_connection_refusal() || error.is_connection_dropped() {
            "Unable to connect to lock server"
        } else if error.is_timeout() {
            "Lock server operation timed out"
        } else {
            "A lock server error occurred"
        };

        Self::with_internal(ErrorCode::LockBackendUnavailable, user_msg, error.to_string())
            .with_source(error)
    }
}

impl From<serde_json::Error> for LockstepError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationError,
            "Failed to process JSON data",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<tokio::time::error::Elapsed> for LockstepError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::with_internal(ErrorCode::JobTimedOut, "Operation timed out", error.to_string())
            .with_source(error)
    }
}

impl From<std::io::Error> for LockstepError {
    fn from(error: std::io::Error) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An I/O error occurred", error.to_string())
            .with_source(error)
    }
}

impl From<anyhow::Error> for LockstepError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<LockstepError>() {
            Ok(inner) => inner,
            Err(error) => Self::internal(error.to_string()),
        }
    }
}

impl From<config::ConfigError> for LockstepError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::NotFound(_) => (
                ErrorCode::MissingConfiguration,
                "Required configuration not found",
            ),
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => (
                ErrorCode::InvalidConfiguration,
                "Configuration file is invalid",
            ),
            _ => (ErrorCode::ConfigurationError, "Configuration error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string())
    }
}
