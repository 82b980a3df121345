//! In-process demo of the lock-coordinated processing flow.
//!
//! Enqueues `job1`, `job2` and a duplicate `job1`, runs a processor until the
//! queue drains, then prints the final status table.

use anyhow::{Context, Result};
use clap::Args;
use lockstep_core::jobs::{
    Job, JobError, JobProcessor, JobStatus, ProcessorConfig, StatusTracker, WorkQueue,
};
use lockstep_core::lock::{LockBackend, LockCoordinator, QuorumLockBackend};
use std::sync::Arc;
use std::time::Duration;

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct DemoArgs {
    /// Redis lock endpoints (comma separated); in-memory nodes when omitted
    #[arg(long, value_delimiter = ',')]
    pub redis: Vec<String>,

    /// Number of in-memory lock nodes
    #[arg(long, default_value_t = 3)]
    pub nodes: usize,

    /// Simulated work per job, in milliseconds
    #[arg(long, default_value_t = 200)]
    pub work_ms: u64,

    /// Processor poll interval, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub poll_ms: u64,

    /// Make the named job fail instead of completing
    #[arg(long)]
    pub fail: Vec<String>,

    /// Give up waiting for the queue to drain after this many seconds
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            redis: Vec::new(),
            nodes: 3,
            work_ms: 200,
            poll_ms: 100,
            fail: Vec::new(),
            timeout_secs: 60,
        }
    }
}

fn backend(args: &DemoArgs) -> Result<Arc<dyn LockBackend>> {
    if args.redis.is_empty() {
        anyhow::ensure!(args.nodes > 0, "--nodes must be at least 1");
        return Ok(Arc::new(QuorumLockBackend::in_memory(args.nodes)));
    }
    Ok(Arc::new(QuorumLockBackend::redis(&args.redis)?))
}

fn demo_job(id: &str, work: Duration, fail: bool) -> Job {
    let name = id.to_string();
    Job::from_fn(id, move || {
        let name = name.clone();
        async move {
            output::print_info(&format!("Executing {}", name));
            tokio::time::sleep(work).await;
            if fail {
                return Err(JobError::new(format!("{} was told to fail", name)));
            }
            Ok(())
        }
    })
}

/// Run the scenario and return the final job statuses.
pub async fn run_scenario(args: &DemoArgs) -> Result<Vec<JobStatus>> {
    let config = ProcessorConfig {
        name: "lockstep-demo".into(),
        poll_interval: Duration::from_millis(args.poll_ms),
        ..Default::default()
    };
    let coordinator = Arc::new(LockCoordinator::new(backend(args)?, config.lock.clone()));
    let processor = Arc::new(JobProcessor::new(
        Arc::new(WorkQueue::new()),
        coordinator,
        Arc::new(StatusTracker::new()),
        config,
    ));

    let work = Duration::from_millis(args.work_ms);
    let mut accepted = 0;
    for id in ["job1", "job2", "job1"] {
        let fail = args.fail.iter().any(|f| f == id);
        if processor.queue().enqueue(demo_job(id, work, fail)) {
            accepted += 1;
            output::print_info(&format!("Enqueued {}", id));
        } else {
            output::print_info(&format!("Skipped duplicate {}", id));
        }
    }

    let handle = processor.start();
    let drained = tokio::time::timeout(Duration::from_secs(args.timeout_secs), async {
        loop {
            let summary = processor.tracker().summary();
            if summary.completed + summary.failed >= accepted {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    handle.shutdown().await.context("processor did not shut down cleanly")?;
    drained.map_err(|_| anyhow::anyhow!("queue did not drain within {}s", args.timeout_secs))?;

    Ok(processor.tracker().get_all())
}

pub async fn execute(args: DemoArgs, format: OutputFormat) -> Result<()> {
    let statuses = run_scenario(&args).await?;

    if let OutputFormat::Table = format {
        output::print_header("Job Status");
    }
    output::print_jobs(&statuses, format)
}
