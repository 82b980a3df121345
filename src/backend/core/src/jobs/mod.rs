//! Background job system.
//!
//! - **Job**: an id plus an async action
//! - **WorkQueue**: FIFO of pending jobs, deduplicated by id
//! - **StatusTracker**: lifecycle of every job the processor has started
//! - **JobProcessor**: loop that runs each job under a distributed lease
//! - **builtin**: maintenance jobs the server enqueues on an interval
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────────┐    ┌──────────────┐
//! │  Producers  │───▶│  WorkQueue  │───▶│  JobProcessor   │───▶│ StatusTracker│
//! │  (enqueue)  │    │ (FIFO+dedup)│    │ (poll, 1 at a   │    │ (running/    │
//! └─────────────┘    └─────────────┘    │  time)          │    │  completed/  │
//!                                       └────────┬────────┘    │  failed)     │
//!                                                │             └──────────────┘
//!                                                ▼
//!                                       ┌─────────────────┐
//!                                       │ LockCoordinator │
//!                                       └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use lockstep_core::jobs::{Job, JobProcessor, ProcessorConfig, StatusTracker, WorkQueue};
//! use lockstep_core::lock::{LockCoordinator, QuorumLockBackend};
//!
//! let queue = Arc::new(WorkQueue::new());
//! let tracker = Arc::new(StatusTracker::new());
//! let config = ProcessorConfig::default();
//! let coordinator = Arc::new(LockCoordinator::new(
//!     Arc::new(QuorumLockBackend::in_memory(3)),
//!     config.lock.clone(),
//! ));
//!
//! queue.enqueue(Job::from_fn("job1", || async { Ok(()) }));
//!
//! let processor = Arc::new(JobProcessor::new(queue, coordinator, tracker, config));
//! let handle = processor.start();
//! // ...
//! handle.shutdown().await?;
//! ```

pub mod builtin;
pub mod job;
pub mod processor;
pub mod queue;
pub mod status;

pub use job::{action_fn, FnAction, Job, JobAction, JobError, JobResult};
pub use processor::{
    JobProcessor, ProcessorConfig, ProcessorHandle, ProcessorReport, ProcessorState,
    ProcessorStats,
};
pub use queue::WorkQueue;
pub use status::{JobState, JobStatus, StatusSummary, StatusTracker};
