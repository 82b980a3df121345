//! Run an action while holding a distributed lease.
//!
//! The action runs on its own task and is raced against the lease expiry.
//! Whatever happens, the lease is released before returning.
//!
//! # Expiry semantics
//!
//! When the expiry deadline fires first, the coordinator stops waiting,
//! releases the lease and reports [`LockOutcome::TimedOut`]. The action task
//! is left running unless [`LockOptions::abort_on_expiry`] is set, so another
//! holder may start on the same resource while it finishes.

use metrics::counter;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn, Instrument};

use super::{LockBackend, LockOptions};
use crate::error::{ErrorCode, LockstepError, Result};
use crate::jobs::JobAction;

/// Failure reason recorded when the lease could not be obtained.
pub const LOCK_NOT_ACQUIRED: &str = "Lock not acquired";

/// Result of one lock-protected execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// Lease acquired and the action finished successfully
    Completed,
    /// Lease not acquired within the wait timeout; the action never ran
    NotAcquired,
    /// The action outlived the lease expiry
    TimedOut { expiry: Duration },
    /// The action returned an error or panicked
    Failed { message: String },
}

impl LockOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Message to record against the job, `None` on success.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Completed => None,
            Self::NotAcquired => Some(LOCK_NOT_ACQUIRED.to_string()),
            Self::TimedOut { expiry } => Some(format!("Execution timed out after {:?}", expiry)),
            Self::Failed { message } => Some(message.clone()),
        }
    }

    /// Convert to a `Result` for callers that treat every failure as an error.
    pub fn into_result(self) -> Result<()> {
        let reason = self.failure_reason();
        let code = match self {
            Self::Completed => return Ok(()),
            Self::NotAcquired => ErrorCode::LockNotAcquired,
            Self::TimedOut { .. } => ErrorCode::JobTimedOut,
            Self::Failed { .. } => ErrorCode::JobExecutionFailed,
        };
        Err(LockstepError::new(code, reason.unwrap_or_default()))
    }

    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::NotAcquired => "not_acquired",
            Self::TimedOut { .. } => "timed_out",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Executes actions under a lease from a [`LockBackend`].
pub struct LockCoordinator {
    backend: Arc<dyn LockBackend>,
    defaults: LockOptions,
}

impl LockCoordinator {
    pub fn new(backend: Arc<dyn LockBackend>, defaults: LockOptions) -> Self {
        Self { backend, defaults }
    }

    pub fn backend(&self) -> &Arc<dyn LockBackend> {
        &self.backend
    }

    pub fn defaults(&self) -> &LockOptions {
        &self.defaults
    }

    /// Run `action` under a lease on `resource` using the default options.
    pub async fn execute_with_lock(
        &self,
        resource: &str,
        action: Arc<dyn JobAction>,
    ) -> Result<LockOutcome> {
        self.execute_with_options(resource, action, &self.defaults).await
    }

    /// Run `action` under a lease on `resource`.
    ///
    /// Returns `Err` only for invalid input or a backend fault; every
    /// outcome of the action itself is a [`LockOutcome`].
    pub async fn execute_with_options(
        &self,
        resource: &str,
        action: Arc<dyn JobAction>,
        options: &LockOptions,
    ) -> Result<LockOutcome> {
        if resource.is_empty() {
            return Err(LockstepError::empty_resource());
        }

        let span = tracing::info_span!("lock", resource, backend = %self.backend.describe());
        self.execute_leased(resource, action, options)
            .instrument(span)
            .await
    }

    async fn execute_leased(
        &self,
        resource: &str,
        action: Arc<dyn JobAction>,
        options: &LockOptions,
    ) -> Result<LockOutcome> {
        let lease = match self.backend.acquire(resource, options).await? {
            Some(lease) => lease,
            None => {
                warn!(wait = ?options.wait_timeout, "Could not acquire lock");
                counter!("lockstep_lock_acquire_total", "outcome" => "not_acquired").increment(1);
                return Ok(LockOutcome::NotAcquired);
            }
        };
        counter!("lockstep_lock_acquire_total", "outcome" => "acquired").increment(1);
        debug!(validity = ?lease.validity, "Lock acquired");

        let started = Instant::now();
        let outcome = run_until_expiry(action, options).await;
        debug!(
            elapsed = ?started.elapsed(),
            remaining = ?lease.remaining(),
            outcome = outcome.label(),
            "Action finished"
        );
        if outcome.succeeded() && !lease.is_valid() {
            warn!(
                validity = ?lease.validity,
                "Action finished after lease validity; another holder may have overlapped"
            );
        }

        if let Err(e) = self.backend.release(&lease).await {
            error!(error = %e, "Failed to release lock");
        }
        Ok(outcome)
    }
}

async fn run_until_expiry(action: Arc<dyn JobAction>, options: &LockOptions) -> LockOutcome {
    let mut task = tokio::spawn(async move { action.run().await });

    match tokio::time::timeout(options.expiry, &mut task).await {
        Ok(Ok(Ok(()))) => LockOutcome::Completed,
        Ok(Ok(Err(e))) => LockOutcome::Failed { message: e.to_string() },
        Ok(Err(join_error)) if join_error.is_panic() => LockOutcome::Failed {
            message: format!("job panicked: {}", panic_message(join_error.into_panic().as_ref())),
        },
        Ok(Err(_)) => LockOutcome::Failed {
            message: "job cancelled".to_string(),
        },
        Err(_) => {
            if options.abort_on_expiry {
                task.abort();
                warn!(expiry = ?options.expiry, "Lease expired; action aborted");
            } else {
                warn!(
                    expiry = ?options.expiry,
                    "Lease expired while action still running; action continues unprotected"
                );
            }
            LockOutcome::TimedOut {
                expiry: options.expiry,
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
