//! Distributed lock client.
//!
//! The lock servers themselves are external. This module holds the client
//! side of the contract:
//!
//! - **LockBackend**: acquire/release a lease on a named resource
//! - **QuorumLockBackend**: majority acquisition across independent [`LockNode`]s
//! - **RedisLockNode** / **MemoryLockNode**: the two node kinds
//! - **LockCoordinator**: "run this action while holding the lease"
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌────────────────────┐     ┌──────────────┐
//! │ LockCoordinator  │────▶│ QuorumLockBackend  │────▶│ LockNode × N │
//! │ (execute + race) │     │ (majority, drift)  │     │ (Redis/mem)  │
//! └──────────────────┘     └────────────────────┘     └──────────────┘
//! ```

pub mod coordinator;
pub mod memory_node;
pub mod quorum;
pub mod redis_node;

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::Result;

pub use coordinator::{LockCoordinator, LockOutcome, LOCK_NOT_ACQUIRED};
pub use memory_node::MemoryLockNode;
pub use quorum::QuorumLockBackend;
pub use redis_node::RedisLockNode;

/// Timing parameters for one lock-protected execution.
#[derive(Debug, Clone, PartialEq)]
pub struct LockOptions {
    /// Lease lifetime; also the deadline raced against the action
    pub expiry: Duration,
    /// Maximum time spent trying to acquire the lease
    pub wait_timeout: Duration,
    /// Pause between acquisition attempts
    pub retry_interval: Duration,
    /// Abort the action task when the expiry deadline fires.
    ///
    /// Off by default: the action keeps running detached after the lease is
    /// released, so mutual exclusion only holds for actions that finish
    /// within `expiry`.
    pub abort_on_expiry: bool,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(30),
            wait_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_millis(100),
            abort_on_expiry: false,
        }
    }
}

impl LockOptions {
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_abort_on_expiry(mut self, abort: bool) -> Self {
        self.abort_on_expiry = abort;
        self
    }
}

/// An exclusive grant on a resource, held for at most `validity`.
#[derive(Debug, Clone)]
pub struct Lease {
    /// Resource name the lease covers
    pub resource: String,
    /// Random value identifying this holder on every node
    pub token: String,
    /// Requested lease lifetime
    pub expiry: Duration,
    /// Lifetime left after acquisition cost and clock drift
    pub validity: Duration,
    /// When the lease was granted
    pub acquired_at: Instant,
}

impl Lease {
    /// Whether the lease is still within its validity window.
    pub fn is_valid(&self) -> bool {
        self.acquired_at.elapsed() < self.validity
    }

    /// Validity left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.validity.saturating_sub(self.acquired_at.elapsed())
    }
}

/// A lock service able to grant exclusive leases on named resources.
///
/// Implementations can be swapped (quorum of Redis nodes, a single in-process
/// node, a consensus log) without touching the coordinator or processor.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Try to acquire a lease, retrying until `options.wait_timeout` elapses.
    ///
    /// Returns `Ok(None)` when the lease could not be obtained in time.
    async fn acquire(&self, resource: &str, options: &LockOptions) -> Result<Option<Lease>>;

    /// Release a lease previously returned by `acquire`.
    async fn release(&self, lease: &Lease) -> Result<()>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// One independent lock server.
#[async_trait]
pub trait LockNode: Send + Sync {
    /// Address of the node, for logs.
    fn endpoint(&self) -> &str;

    /// Set `resource` to `token` with a time-to-live if it is not already held.
    async fn try_lock(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Delete `resource` only if it still holds `token`.
    async fn unlock(&self, resource: &str, token: &str) -> Result<bool>;
}
