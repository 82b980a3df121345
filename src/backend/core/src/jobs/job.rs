//! Job definitions.
//!
//! - **Job**: a uniquely identified unit of asynchronous work
//! - **JobAction**: the capability a job carries; a single `run` returning success or a `JobError`
//! - **FnAction**: adapter turning an async closure into a `JobAction`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::LockstepError;

// ═══════════════════════════════════════════════════════════════════════════════
// Job Error
// ═══════════════════════════════════════════════════════════════════════════════

/// Error type for job execution failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    /// Error message
    pub message: String,
    /// Optional error code
    pub code: Option<String>,
}

impl JobError {
    /// Create a new job error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Add an error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code: {})", code)?;
        }
        Ok(())
    }
}

impl std::error::Error for JobError {}

impl From<LockstepError> for JobError {
    fn from(error: LockstepError) -> Self {
        Self {
            message: error.user_message().to_string(),
            code: Some(error.code().to_string()),
        }
    }
}

impl From<anyhow::Error> for JobError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error.to_string())
    }
}

impl From<&str> for JobError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for JobError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Result type for job execution.
pub type JobResult = std::result::Result<(), JobError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Job Action
// ═══════════════════════════════════════════════════════════════════════════════

/// The unit of work a job performs.
///
/// Actions may have arbitrary side effects that are opaque to the coordinator.
/// They are run on their own task so that a lease expiry can stop waiting
/// for them without cancelling them.
#[async_trait]
pub trait JobAction: Send + Sync + 'static {
    /// Run the action once.
    async fn run(&self) -> JobResult;
}

/// A `JobAction` backed by an async closure.
pub struct FnAction<F> {
    f: F,
}

impl<F> FnAction<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> JobAction for FnAction<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobResult> + Send + 'static,
{
    async fn run(&self) -> JobResult {
        (self.f)().await
    }
}

/// Wrap an async closure as a shareable action.
///
/// ```rust,ignore
/// let action = action_fn(|| async {
///     tokio::time::sleep(Duration::from_millis(100)).await;
///     Ok(())
/// });
/// ```
pub fn action_fn<F, Fut>(f: F) -> Arc<dyn JobAction>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobResult> + Send + 'static,
{
    Arc::new(FnAction::new(f))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job
// ═══════════════════════════════════════════════════════════════════════════════

/// A uniquely identified unit of asynchronous work submitted to the queue.
#[derive(Clone)]
pub struct Job {
    id: String,
    action: Arc<dyn JobAction>,
}

impl Job {
    /// Create a job from an id and an action.
    pub fn new(id: impl Into<String>, action: Arc<dyn JobAction>) -> Self {
        Self {
            id: id.into(),
            action,
        }
    }

    /// Create a job from an async closure.
    pub fn from_fn<F, Fut>(id: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        Self::new(id, action_fn(f))
    }

    /// The job's identity within the queue.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// A shared handle to the job's action.
    pub fn action(&self) -> Arc<dyn JobAction> {
        Arc::clone(&self.action)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish_non_exhaustive()
    }
}
