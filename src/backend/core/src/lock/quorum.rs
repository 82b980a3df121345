//! Majority-quorum lock acquisition.
//!
//! A lease is granted when a strict majority of independent nodes accept the
//! same random token within the lease lifetime. Each attempt:
//!
//! 1. Sends `try_lock` to every node concurrently, each bounded by `node_timeout`
//! 2. Counts acceptances; a node error or timeout counts as a rejection
//! 3. Computes validity as `expiry - elapsed - drift`
//! 4. Succeeds if quorum was reached and validity is positive, otherwise
//!    unlocks every node and retries after `retry_interval`; the last retry
//!    lands on the `wait_timeout` deadline itself

use async_trait::async_trait;
use futures::future::join_all;
use metrics::histogram;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Lease, LockBackend, LockNode, LockOptions, MemoryLockNode, RedisLockNode};
use crate::error::{ErrorCode, LockstepError, Result};

/// Default per-node call budget.
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_millis(50);

/// Default clock drift allowance, as a fraction of the lease lifetime.
pub const DEFAULT_CLOCK_DRIFT_FACTOR: f64 = 0.01;

/// Largest accepted drift factor; at 1.0 no lease would ever be valid.
pub const MAX_CLOCK_DRIFT_FACTOR: f64 = 0.5;

/// Lock backend spread over independent nodes.
pub struct QuorumLockBackend {
    nodes: Vec<Arc<dyn LockNode>>,
    node_timeout: Duration,
    clock_drift_factor: f64,
}

impl QuorumLockBackend {
    /// Create a backend over the given nodes.
    pub fn new(nodes: Vec<Arc<dyn LockNode>>) -> Self {
        Self {
            nodes,
            node_timeout: DEFAULT_NODE_TIMEOUT,
            clock_drift_factor: DEFAULT_CLOCK_DRIFT_FACTOR,
        }
    }

    /// Connect lazily to one Redis node per endpoint.
    pub fn redis<S: AsRef<str>>(endpoints: &[S]) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(LockstepError::invalid_configuration(
                "at least one lock endpoint is required",
            ));
        }
        let nodes = endpoints
            .iter()
            .map(|endpoint| {
                RedisLockNode::new(endpoint.as_ref()).map(|node| Arc::new(node) as Arc<dyn LockNode>)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(nodes))
    }

    /// `count` independent in-process nodes.
    pub fn in_memory(count: usize) -> Self {
        let nodes = (0..count)
            .map(|i| Arc::new(MemoryLockNode::new(format!("memory://{}", i))) as Arc<dyn LockNode>)
            .collect();
        Self::new(nodes)
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    /// Set the drift allowance.
    ///
    /// Values are clamped to `[0, MAX_CLOCK_DRIFT_FACTOR]`; NaN falls back to
    /// the default.
    pub fn with_clock_drift_factor(mut self, factor: f64) -> Self {
        let clamped = if factor.is_nan() {
            DEFAULT_CLOCK_DRIFT_FACTOR
        } else {
            factor.clamp(0.0, MAX_CLOCK_DRIFT_FACTOR)
        };
        if clamped != factor {
            warn!(requested = factor, used = clamped, "Clock drift factor out of range");
        }
        self.clock_drift_factor = clamped;
        self
    }

    pub fn clock_drift_factor(&self) -> f64 {
        self.clock_drift_factor
    }

    /// Number of nodes that must agree.
    pub fn quorum(&self) -> usize {
        self.nodes.len() / 2 + 1
    }

    pub fn nodes(&self) -> &[Arc<dyn LockNode>] {
        &self.nodes
    }

    async fn lock_all(&self, resource: &str, token: &str, ttl: Duration) -> usize {
        let calls = self.nodes.iter().map(|node| async move {
            match tokio::time::timeout(self.node_timeout, node.try_lock(resource, token, ttl)).await {
                Ok(Ok(locked)) => locked,
                Ok(Err(e)) => {
                    debug!(node = node.endpoint(), error = %e, "Lock node rejected with error");
                    false
                }
                Err(_) => {
                    debug!(node = node.endpoint(), "Lock node timed out");
                    false
                }
            }
        });
        join_all(calls).await.into_iter().filter(|locked| *locked).count()
    }

    /// Unlock on every node; returns how many nodes errored.
    async fn unlock_all(&self, resource: &str, token: &str) -> usize {
        let calls = self.nodes.iter().map(|node| async move {
            match tokio::time::timeout(self.node_timeout, node.unlock(resource, token)).await {
                Ok(Ok(_)) => true,
                Ok(Err(e)) => {
                    debug!(node = node.endpoint(), error = %e, "Unlock failed on node");
                    false
                }
                Err(_) => {
                    debug!(node = node.endpoint(), "Unlock timed out on node");
                    false
                }
            }
        });
        join_all(calls).await.into_iter().filter(|ok| !*ok).count()
    }
}

/// Lease lifetime left after acquisition cost and clock drift, if any.
pub(crate) fn validity(expiry: Duration, elapsed: Duration, drift_factor: f64) -> Option<Duration> {
    let drift = expiry.mul_f64(drift_factor) + Duration::from_millis(2);
    expiry
        .checked_sub(elapsed)?
        .checked_sub(drift)
        .filter(|left| !left.is_zero())
}

#[async_trait]
impl LockBackend for QuorumLockBackend {
    async fn acquire(&self, resource: &str, options: &LockOptions) -> Result<Option<Lease>> {
        if resource.is_empty() {
            return Err(LockstepError::empty_resource());
        }

        let token = Uuid::new_v4().to_string();
        let quorum = self.quorum();
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let attempt_started = Instant::now();
            let locked = self.lock_all(resource, &token, options.expiry).await;
            let elapsed = attempt_started.elapsed();

            if locked >= quorum {
                if let Some(validity) = validity(options.expiry, elapsed, self.clock_drift_factor) {
                    histogram!("lockstep_lock_acquire_seconds").record(started.elapsed().as_secs_f64());
                    debug!(resource, attempts, locked, quorum, ?validity, "Lease acquired");
                    return Ok(Some(Lease {
                        resource: resource.to_string(),
                        token,
                        expiry: options.expiry,
                        validity,
                        acquired_at: attempt_started,
                    }));
                }
            }

            self.unlock_all(resource, &token).await;

            let waited = started.elapsed();
            if waited >= options.wait_timeout {
                debug!(resource, attempts, locked, quorum, "Lease not acquired before wait timeout");
                return Ok(None);
            }
            tokio::time::sleep(options.retry_interval.min(options.wait_timeout - waited)).await;
        }
    }

    async fn release(&self, lease: &Lease) -> Result<()> {
        let failed = self.unlock_all(&lease.resource, &lease.token).await;
        if failed > 0 {
            warn!(
                resource = %lease.resource,
                failed,
                nodes = self.nodes.len(),
                "Lease not released on every node; it will lapse at expiry"
            );
        }
        if !self.nodes.is_empty() && failed == self.nodes.len() {
            return Err(LockstepError::with_internal(
                ErrorCode::LockReleaseFailed,
                "Failed to release lock",
                format!("no node accepted unlock for {}", lease.resource),
            ));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("quorum {}/{}", self.quorum(), self.nodes.len())
    }
}
