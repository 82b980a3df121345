//! Integration tests for the job processor loop.
//!
//! Tests cover:
//! - End-to-end enqueue, dedup and processing
//! - Status recording for every outcome
//! - Cooperative shutdown during the poll sleep and during a job
//! - Errors caught at the loop level
//! - State machine (start once, stop is final)
//! - Two processors sharing one lock backend
//! - Server wiring with the built-in jobs

use lockstep_core::config::Config;
use lockstep_core::error::ErrorCode;
use lockstep_core::jobs::builtin::{self, LOCK_CHECK_JOB, STATUS_REPORT_JOB};
use lockstep_core::jobs::{
    Job, JobError, JobProcessor, JobState, ProcessorConfig, ProcessorState, StatusTracker,
    WorkQueue,
};
use lockstep_core::lock::{LockBackend, LockCoordinator, LockOptions, QuorumLockBackend};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn build(config: ProcessorConfig) -> (Arc<JobProcessor>, Arc<QuorumLockBackend>) {
    let backend = Arc::new(QuorumLockBackend::in_memory(3));
    (build_on(backend.clone(), config), backend)
}

fn build_on(backend: Arc<QuorumLockBackend>, config: ProcessorConfig) -> Arc<JobProcessor> {
    let coordinator = Arc::new(LockCoordinator::new(backend, config.lock.clone()));
    Arc::new(JobProcessor::new(
        Arc::new(WorkQueue::new()),
        coordinator,
        Arc::new(StatusTracker::new()),
        config,
    ))
}

fn counting_job(id: &str, calls: Arc<AtomicU32>) -> Job {
    Job::from_fn(id, move || {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

// ============================================================================
// End-to-End Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_enqueue_dedup_and_process() {
    let (processor, _) = build(ProcessorConfig::default());
    let job1_calls = Arc::new(AtomicU32::new(0));
    let job2_calls = Arc::new(AtomicU32::new(0));

    assert!(processor.queue().enqueue(counting_job("job1", job1_calls.clone())));
    assert!(processor.queue().enqueue(counting_job("job2", job2_calls.clone())));
    assert!(!processor.queue().enqueue(counting_job("job1", job1_calls.clone())));
    assert_eq!(processor.queue().len(), 2);

    let handle = processor.start();
    tokio::time::sleep(Duration::from_secs(5)).await;
    handle.shutdown().await.unwrap();

    let statuses = processor.tracker().get_all();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|s| s.state == JobState::Completed));
    assert_eq!(job1_calls.load(Ordering::SeqCst), 1);
    assert_eq!(job2_calls.load(Ordering::SeqCst), 1);
    assert!(processor.queue().is_empty());

    let report = processor.report();
    assert_eq!(report.processed, 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.state, ProcessorState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_jobs_run_in_fifo_order() {
    let (processor, _) = build(ProcessorConfig::default());
    for id in ["A", "B", "C"] {
        processor.queue().enqueue(Job::from_fn(id, || async { Ok(()) }));
    }

    for _ in 0..3 {
        assert!(processor.process_next().await.unwrap());
    }

    let order: Vec<String> = processor
        .tracker()
        .get_all()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(order, vec!["A", "B", "C"]);
}

#[tokio::test(start_paused = true)]
async fn test_failing_job_is_recorded() {
    let (processor, _) = build(ProcessorConfig::default());
    processor
        .queue()
        .enqueue(Job::from_fn("bad", || async { Err(JobError::new("Test exception")) }));

    processor.process_next().await.unwrap();

    let status = processor.tracker().get("bad").unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.error.as_deref(), Some("Test exception"));
    assert!(status.completed_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_long_job_times_out() {
    let (processor, _) = build(ProcessorConfig::default());
    processor.queue().enqueue(Job::from_fn("slow", || async {
        tokio::time::sleep(Duration::from_secs(35)).await;
        Ok(())
    }));

    processor.process_next().await.unwrap();

    let status = processor.tracker().get("slow").unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.error.as_deref(), Some("Execution timed out after 30s"));
}

#[tokio::test(start_paused = true)]
async fn test_contended_job_fails_with_lock_not_acquired() {
    let config = ProcessorConfig {
        lock: LockOptions::default().with_wait_timeout(Duration::from_millis(500)),
        ..Default::default()
    };
    let (processor, backend) = build(config.clone());
    let _held = backend
        .acquire(&config.resource_for("busy"), &config.lock)
        .await
        .unwrap()
        .unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    processor.queue().enqueue(counting_job("busy", calls.clone()));
    processor.process_next().await.unwrap();

    let status = processor.tracker().get("busy").unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.error.as_deref(), Some("Lock not acquired"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(processor.stats().not_acquired(), 1);
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_during_sleep_exits_promptly() {
    let config = ProcessorConfig {
        poll_interval: Duration::from_secs(3600),
        ..Default::default()
    };
    let (processor, _) = build(config);
    let handle = processor.start();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stopping = Instant::now();
    handle.shutdown().await.unwrap();
    assert!(stopping.elapsed() < Duration::from_secs(1));
    assert_eq!(processor.state(), ProcessorState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_job_finishes_before_stop() {
    let (processor, _) = build(ProcessorConfig::default());
    processor.queue().enqueue(Job::from_fn("in-flight", || async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok(())
    }));
    processor.queue().enqueue(Job::from_fn("never", || async { Ok(()) }));

    let handle = processor.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.shutdown().await.unwrap();

    let status = processor.tracker().get("in-flight").unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert!(processor.tracker().get("never").is_none());
    assert!(processor.queue().contains("never"));
}

#[tokio::test(start_paused = true)]
async fn test_run_with_cancelled_token_returns_immediately() {
    let (processor, _) = build(ProcessorConfig::default());
    processor.queue().enqueue(Job::from_fn("job1", || async { Ok(()) }));

    let token = CancellationToken::new();
    token.cancel();
    processor.run(token).await.unwrap();

    assert_eq!(processor.state(), ProcessorState::Stopped);
    assert!(processor.queue().contains("job1"));
}

// ============================================================================
// Loop Error and State Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_loop_survives_processing_error() {
    let config = ProcessorConfig {
        resource_prefix: String::new(),
        poll_interval: Duration::from_millis(10),
        ..Default::default()
    };
    let (processor, _) = build(config);
    processor.queue().enqueue(Job::from_fn("", || async { Ok(()) }));
    processor.queue().enqueue(Job::from_fn("after", || async { Ok(()) }));

    let handle = processor.start();
    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.shutdown().await.unwrap();

    let empty = processor.tracker().get("").unwrap();
    assert_eq!(empty.state, JobState::Failed);
    assert_eq!(empty.error.as_deref(), Some("Resource cannot be empty"));
    assert_eq!(
        processor.tracker().get("after").unwrap().state,
        JobState::Completed
    );
    assert_eq!(processor.stats().loop_errors(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_processor_cannot_run_twice() {
    let (processor, _) = build(ProcessorConfig::default());
    let handle = processor.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let err = processor.run(CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidStateTransition);

    handle.shutdown().await.unwrap();
    let err = processor.run(CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidStateTransition);
}

#[tokio::test(start_paused = true)]
async fn test_reenqueue_after_processing_runs_again() {
    let (processor, _) = build(ProcessorConfig::default());
    let calls = Arc::new(AtomicU32::new(0));

    processor.queue().enqueue(counting_job("job1", calls.clone()));
    processor.process_next().await.unwrap();
    assert!(processor.queue().enqueue(counting_job("job1", calls.clone())));
    processor.process_next().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(processor.tracker().len(), 1);
    assert_eq!(
        processor.tracker().get("job1").unwrap().state,
        JobState::Completed
    );
}

// ============================================================================
// Shared Backend Tests
// ============================================================================

type Windows = Arc<Mutex<Vec<(Instant, Instant)>>>;

fn windowed_job(id: &str, work: Duration, windows: Windows) -> Job {
    Job::from_fn(id, move || {
        let windows = windows.clone();
        async move {
            let started = Instant::now();
            tokio::time::sleep(work).await;
            windows.lock().push((started, Instant::now()));
            Ok(())
        }
    })
}

#[tokio::test(start_paused = true)]
async fn test_two_processors_share_backend_without_overlap() {
    let backend = Arc::new(QuorumLockBackend::in_memory(3));
    let first = build_on(backend.clone(), ProcessorConfig::default());
    let second = build_on(backend, ProcessorConfig::default());
    let windows: Windows = Arc::new(Mutex::new(Vec::new()));
    let work = Duration::from_millis(100);

    assert!(first.queue().enqueue(windowed_job("shared", work, windows.clone())));
    assert!(second.queue().enqueue(windowed_job("shared", work, windows.clone())));

    let (a, b) = tokio::join!(first.process_next(), second.process_next());
    assert!(a.unwrap());
    assert!(b.unwrap());

    for processor in [&first, &second] {
        assert_eq!(
            processor.tracker().get("shared").unwrap().state,
            JobState::Completed
        );
    }

    let mut windows = windows.lock().clone();
    assert_eq!(windows.len(), 2);
    windows.sort();
    assert!(windows[0].1 - windows[0].0 >= work);
    assert!(
        windows[0].1 <= windows[1].0,
        "executions overlapped: {:?}",
        windows
    );
}

// ============================================================================
// Server Wiring Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_server_built_processor_runs_builtin_jobs() {
    let config = Config::default();
    let processor = config.build_processor(Arc::new(QuorumLockBackend::in_memory(3)));
    let handle = processor.start();
    let scheduler = builtin::schedule(
        processor.clone(),
        config.processor.builtin_interval,
        handle.shutdown_token(),
    );

    tokio::time::sleep(Duration::from_secs(5)).await;

    for id in [LOCK_CHECK_JOB, STATUS_REPORT_JOB] {
        assert_eq!(processor.tracker().get(id).unwrap().state, JobState::Completed);
    }
    assert_eq!(processor.stats().succeeded(), 2);
    assert!(processor.queue().is_empty());

    handle.shutdown().await.unwrap();
    scheduler.await.unwrap();
}
