//! Background job processor.
//!
//! A single long-lived loop that drains the [`WorkQueue`] one job at a time,
//! runs each job under a lease named `{resource_prefix}{job_id}` and records
//! the result in the [`StatusTracker`]. Between iterations it sleeps for the
//! poll interval; cancellation during that sleep ends the loop at once, while
//! a job already in progress is allowed to finish.

use futures::FutureExt;
use metrics::{counter, histogram};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use super::{Job, StatusTracker, WorkQueue};
use crate::error::{LockstepError, Result};
use crate::lock::coordinator::panic_message;
use crate::lock::{LockCoordinator, LockOptions, LockOutcome};

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for the job processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Processor name, used in logs
    pub name: String,
    /// Sleep between queue polls
    pub poll_interval: Duration,
    /// Prefix joined to the job id to form the lock resource name
    pub resource_prefix: String,
    /// Lease timings for each job
    pub lock: LockOptions,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            name: "lockstep-processor".to_string(),
            poll_interval: Duration::from_secs(1),
            resource_prefix: "job:".to_string(),
            lock: LockOptions::default(),
        }
    }
}

impl ProcessorConfig {
    /// Lock resource guarding a job.
    pub fn resource_for(&self, job_id: &str) -> String {
        format!("{}{}", self.resource_prefix, job_id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// State and Statistics
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle of the processor loop.
///
/// `Idle -> Running -> Stopped`; `Stopped` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorState {
    Idle,
    Running,
    Stopped,
}

/// Counters for the processor loop.
#[derive(Debug, Clone, Default)]
pub struct ProcessorStats {
    /// Jobs taken off the queue
    pub processed: Arc<AtomicU64>,
    /// Jobs that completed
    pub succeeded: Arc<AtomicU64>,
    /// Jobs that failed for any reason
    pub failed: Arc<AtomicU64>,
    /// Failures caused by lock contention
    pub not_acquired: Arc<AtomicU64>,
    /// Errors caught at the loop level
    pub loop_errors: Arc<AtomicU64>,
}

impl ProcessorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn not_acquired(&self) -> u64 {
        self.not_acquired.load(Ordering::Relaxed)
    }

    pub fn loop_errors(&self) -> u64 {
        self.loop_errors.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of the processor for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorReport {
    pub name: String,
    pub state: ProcessorState,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub not_acquired: u64,
    pub loop_errors: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Processor
// ═══════════════════════════════════════════════════════════════════════════════

/// Drains the work queue under distributed locks.
pub struct JobProcessor {
    queue: Arc<WorkQueue>,
    coordinator: Arc<LockCoordinator>,
    tracker: Arc<StatusTracker>,
    config: ProcessorConfig,
    state: RwLock<ProcessorState>,
    stats: ProcessorStats,
}

impl JobProcessor {
    pub fn new(
        queue: Arc<WorkQueue>,
        coordinator: Arc<LockCoordinator>,
        tracker: Arc<StatusTracker>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            queue,
            coordinator,
            tracker,
            config,
            state: RwLock::new(ProcessorState::Idle),
            stats: ProcessorStats::new(),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn state(&self) -> ProcessorState {
        *self.state.read()
    }

    pub fn stats(&self) -> &ProcessorStats {
        &self.stats
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    pub fn tracker(&self) -> &Arc<StatusTracker> {
        &self.tracker
    }

    pub fn coordinator(&self) -> &Arc<LockCoordinator> {
        &self.coordinator
    }

    pub fn report(&self) -> ProcessorReport {
        ProcessorReport {
            name: self.config.name.clone(),
            state: self.state(),
            processed: self.stats.processed(),
            succeeded: self.stats.succeeded(),
            failed: self.stats.failed(),
            not_acquired: self.stats.not_acquired(),
            loop_errors: self.stats.loop_errors(),
        }
    }

    /// Spawn the loop on the runtime, returning a handle for control.
    pub fn start(self: &Arc<Self>) -> ProcessorHandle {
        let shutdown = CancellationToken::new();
        let processor = Arc::clone(self);
        let token = shutdown.clone();
        let task = tokio::spawn(async move { processor.run(token).await });

        ProcessorHandle {
            shutdown,
            task,
            processor: Arc::clone(self),
        }
    }

    /// Run the loop until `shutdown` is cancelled.
    ///
    /// Fails with `InvalidStateTransition` unless the processor is idle.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.transition(ProcessorState::Idle, ProcessorState::Running)?;
        info!(
            processor = %self.config.name,
            poll_interval = ?self.config.poll_interval,
            "Job processor started"
        );

        while !shutdown.is_cancelled() {
            match AssertUnwindSafe(self.process_next()).catch_unwind().await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    self.stats.loop_errors.fetch_add(1, Ordering::Relaxed);
                    error!(processor = %self.config.name, error = %e, "Error processing job");
                }
                Err(payload) => {
                    self.stats.loop_errors.fetch_add(1, Ordering::Relaxed);
                    error!(
                        processor = %self.config.name,
                        panic = %panic_message(payload.as_ref()),
                        "Error processing job"
                    );
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        *self.state.write() = ProcessorState::Stopped;
        info!(processor = %self.config.name, "Job processor stopping");
        Ok(())
    }

    /// Take one job off the queue and run it.
    ///
    /// Returns `Ok(false)` when the queue was empty.
    pub async fn process_next(&self) -> Result<bool> {
        let Some(job) = self.queue.try_dequeue() else {
            return Ok(false);
        };
        self.process(job).await?;
        Ok(true)
    }

    async fn process(&self, job: Job) -> Result<()> {
        let job_id = job.id().to_string();
        let resource = self.config.resource_for(&job_id);
        self.tracker.start(&job_id);
        self.stats.processed.fetch_add(1, Ordering::Relaxed);

        let span = tracing::info_span!("job", job_id = %job_id, resource = %resource);
        async {
            info!("Executing job");
            let started = Instant::now();

            let outcome = match self
                .coordinator
                .execute_with_options(&resource, job.action(), &self.config.lock)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.tracker.fail(&job_id, e.user_message());
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    counter!("lockstep_jobs_total", "outcome" => "error").increment(1);
                    return Err(e);
                }
            };

            histogram!("lockstep_job_duration_seconds").record(started.elapsed().as_secs_f64());
            counter!("lockstep_jobs_total", "outcome" => outcome.label()).increment(1);
            self.record(&job_id, &outcome);
            Ok(())
        }
        .instrument(span)
        .await
    }

    fn record(&self, job_id: &str, outcome: &LockOutcome) {
        match outcome.failure_reason() {
            None => {
                self.tracker.complete(job_id);
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                info!("Completed job");
            }
            Some(reason) => {
                self.tracker.fail(job_id, reason.as_str());
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                if matches!(outcome, LockOutcome::NotAcquired) {
                    self.stats.not_acquired.fetch_add(1, Ordering::Relaxed);
                    warn!("Could not acquire lock for job");
                } else {
                    error!(error = %reason, "Job failed");
                }
            }
        }
    }

    fn transition(&self, from: ProcessorState, to: ProcessorState) -> Result<()> {
        let mut state = self.state.write();
        if *state != from {
            return Err(LockstepError::invalid_state_transition(*state, to));
        }
        *state = to;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Handle
// ═══════════════════════════════════════════════════════════════════════════════

/// Handle for controlling a running processor.
pub struct ProcessorHandle {
    shutdown: CancellationToken,
    task: JoinHandle<Result<()>>,
    processor: Arc<JobProcessor>,
}

impl ProcessorHandle {
    /// Signal the loop to stop after the current job.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Token that stops the loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn processor(&self) -> &Arc<JobProcessor> {
        &self.processor
    }

    /// Wait for the loop to exit.
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| LockstepError::internal(format!("processor task failed: {}", e)))?
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(self) -> Result<()> {
        self.stop();
        self.join().await
    }
}
