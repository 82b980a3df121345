//! In-process lock node.
//!
//! Keeps a lease table in memory and honours expiry, which makes it usable as
//! a single-node backend and as a stand-in for Redis in tests. A node can be
//! switched off to simulate an unreachable server.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use super::LockNode;
use crate::error::{LockstepError, Result};

#[derive(Debug)]
struct Held {
    token: String,
    deadline: Instant,
}

/// Lease table living in the current process.
#[derive(Debug)]
pub struct MemoryLockNode {
    endpoint: String,
    leases: Mutex<HashMap<String, Held>>,
    available: AtomicBool,
}

impl MemoryLockNode {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            leases: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Take the node offline (every call errors) or bring it back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Token currently holding `resource`, ignoring expired entries.
    pub fn holder(&self, resource: &str) -> Option<String> {
        let leases = self.leases.lock();
        leases
            .get(resource)
            .filter(|held| held.deadline > Instant::now())
            .map(|held| held.token.clone())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(LockstepError::lock_backend(&self.endpoint, "node unavailable"))
        }
    }
}

#[async_trait]
impl LockNode for MemoryLockNode {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn try_lock(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.ensure_available()?;
        let now = Instant::now();
        let mut leases = self.leases.lock();
        if let Some(held) = leases.get(resource) {
            if held.deadline > now {
                return Ok(false);
            }
        }
        leases.insert(
            resource.to_string(),
            Held {
                token: token.to_string(),
                deadline: now + ttl,
            },
        );
        Ok(true)
    }

    async fn unlock(&self, resource: &str, token: &str) -> Result<bool> {
        self.ensure_available()?;
        let mut leases = self.leases.lock();
        match leases.get(resource) {
            Some(held) if held.token == token => {
                leases.remove(resource);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let node = MemoryLockNode::new("mem://0");
        assert!(node.try_lock("r", "a", Duration::from_secs(10)).await.unwrap());
        assert!(!node.try_lock("r", "b", Duration::from_secs(10)).await.unwrap());
        assert_eq!(node.holder("r").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_unlock_requires_matching_token() {
        let node = MemoryLockNode::new("mem://0");
        node.try_lock("r", "a", Duration::from_secs(10)).await.unwrap();

        assert!(!node.unlock("r", "b").await.unwrap());
        assert_eq!(node.holder("r").as_deref(), Some("a"));
        assert!(node.unlock("r", "a").await.unwrap());
        assert!(node.holder("r").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lease_can_be_taken() {
        let node = MemoryLockNode::new("mem://0");
        node.try_lock("r", "a", Duration::from_millis(100)).await.unwrap();

        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(node.holder("r").is_none());
        assert!(node.try_lock("r", "b", Duration::from_millis(100)).await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_node_errors() {
        let node = MemoryLockNode::new("mem://0");
        node.set_available(false);
        assert!(node.try_lock("r", "a", Duration::from_secs(1)).await.is_err());
        assert!(node.unlock("r", "a").await.is_err());

        node.set_available(true);
        assert!(node.try_lock("r", "a", Duration::from_secs(1)).await.unwrap());
    }
}
