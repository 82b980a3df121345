//! Built-in maintenance jobs hosted by the server.
//!
//! The server enqueues these on a fixed interval so a deployment always has
//! work flowing through the lock path. Re-enqueueing is safe: the queue drops
//! an id that is still pending.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{action_fn, Job, JobError, JobProcessor, JobResult, StatusTracker};
use crate::error::Result;
use crate::lock::{LockBackend, LockCoordinator, LockOptions};

/// Job that takes and returns a lease on [`LOCK_CHECK_RESOURCE`].
pub const LOCK_CHECK_JOB: &str = "builtin:lock-check";

/// Job that logs the status tracker summary.
pub const STATUS_REPORT_JOB: &str = "builtin:status-report";

/// Resource leased by the lock check job.
pub const LOCK_CHECK_RESOURCE: &str = "lockstep:lock-check";

/// Resource guarding the startup check.
pub const STARTUP_RESOURCE: &str = "lockstep:startup";

/// Lease a throwaway resource across the lock servers and hand it back.
///
/// Fails with `LOCK_NOT_ACQUIRED` when no quorum grants the lease.
pub fn lock_check(backend: Arc<dyn LockBackend>, options: LockOptions) -> Job {
    action_job(LOCK_CHECK_JOB, move || {
        let backend = backend.clone();
        let options = options.clone();
        async move {
            let lease = backend
                .acquire(LOCK_CHECK_RESOURCE, &options)
                .await?
                .ok_or_else(|| {
                    JobError::new("lock check lease not granted").with_code("LOCK_NOT_ACQUIRED")
                })?;
            debug!(validity = ?lease.validity, backend = %backend.describe(), "Lock check lease granted");
            backend.release(&lease).await?;
            Ok(())
        }
    })
}

/// Log per-state job counts.
pub fn status_report(tracker: Arc<StatusTracker>) -> Job {
    action_job(STATUS_REPORT_JOB, move || {
        let tracker = tracker.clone();
        async move {
            let summary = tracker.summary();
            info!(
                running = summary.running,
                completed = summary.completed,
                failed = summary.failed,
                total = summary.total(),
                "Job status summary"
            );
            Ok(())
        }
    })
}

fn action_job<F, Fut>(id: &str, f: F) -> Job
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobResult> + Send + 'static,
{
    Job::new(id, action_fn(f))
}

/// The built-in jobs for `processor`.
pub fn builtin_jobs(processor: &JobProcessor) -> Vec<Job> {
    let coordinator = processor.coordinator();
    let check_options = coordinator
        .defaults()
        .clone()
        .with_expiry(Duration::from_secs(5))
        .with_wait_timeout(Duration::ZERO);
    vec![
        lock_check(coordinator.backend().clone(), check_options),
        status_report(processor.tracker().clone()),
    ]
}

/// Enqueue the built-in jobs; returns how many were not already pending.
pub fn enqueue_builtin(processor: &JobProcessor) -> usize {
    builtin_jobs(processor)
        .into_iter()
        .filter(|job| processor.queue().enqueue(job.clone()))
        .count()
}

/// Enqueue the built-in jobs now and then every `interval` until `shutdown`.
pub fn schedule(
    processor: Arc<JobProcessor>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let added = enqueue_builtin(&processor);
                    debug!(added, "Built-in jobs enqueued");
                }
            }
        }
    })
}

/// Run a no-op under a lease to confirm the lock servers grant quorum.
pub async fn startup_check(coordinator: &LockCoordinator) -> Result<()> {
    coordinator
        .execute_with_lock(STARTUP_RESOURCE, action_fn(|| async { Ok(()) }))
        .await?
        .into_result()?;
    info!(backend = %coordinator.backend().describe(), "Lock servers granted startup lease");
    Ok(())
}
