#![allow(clippy::result_large_err)]
//! # Lockstep Core
//!
//! Background jobs coordinated by distributed locks.
//!
//! ## Architecture
//!
//! - **Work Queue**: FIFO of pending jobs, deduplicated by id
//! - **Lock Coordinator**: runs an action under a quorum lease, raced against the lease expiry
//! - **Job Processor**: single loop draining the queue, one lease per job
//! - **Status Tracker**: running/completed/failed record for every started job
//! - **API**: read-only HTTP status surface
//! - **Telemetry**: structured logging and Prometheus metrics

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod lock;
pub mod telemetry;

pub use error::{ErrorCode, ErrorSeverity, LockstepError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{ErrorCode, ErrorSeverity, LockstepError, Result};
    pub use crate::jobs::{
        action_fn, Job, JobAction, JobError, JobProcessor, JobResult, JobState, JobStatus,
        ProcessorConfig, ProcessorHandle, ProcessorState, StatusSummary, StatusTracker,
        WorkQueue,
    };
    pub use crate::lock::{
        Lease, LockBackend, LockCoordinator, LockNode, LockOptions, LockOutcome,
        MemoryLockNode, QuorumLockBackend, RedisLockNode,
    };
}
