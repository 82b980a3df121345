//! Redis lock node.
//!
//! A lease is a plain key: `SET resource token NX PX ttl` takes it and a Lua
//! compare-and-delete gives it back, so a holder can never delete a key that
//! expired and was re-acquired by someone else.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

use super::LockNode;
use crate::error::{LockstepError, Result};

static UNLOCK_SCRIPT: OnceLock<redis::Script> = OnceLock::new();

fn unlock_script() -> &'static redis::Script {
    UNLOCK_SCRIPT.get_or_init(|| {
        redis::Script::new(
            r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            else
                return 0
            end
            "#,
        )
    })
}

/// One Redis server taking part in the quorum.
pub struct RedisLockNode {
    endpoint: String,
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
}

impl RedisLockNode {
    /// Create a node for a `redis://` URL.
    ///
    /// No connection is made until the first lock call, so an unreachable
    /// server only costs its share of the quorum.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        let client = redis::Client::open(endpoint.as_str())
            .map_err(|e| LockstepError::lock_backend(&endpoint, e.to_string()))?;

        Ok(Self {
            endpoint,
            client,
            conn: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                debug!(endpoint = %self.endpoint, "Connecting to lock node");
                ConnectionManager::new(self.client.clone()).await
            })
            .await
            .map_err(|e| LockstepError::lock_backend(&self.endpoint, e.to_string()))?;
        Ok(conn.clone())
    }
}

impl std::fmt::Debug for RedisLockNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLockNode")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.conn.initialized())
            .finish()
    }
}

#[async_trait]
impl LockNode for RedisLockNode {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn try_lock(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(resource)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| LockstepError::lock_backend(&self.endpoint, e.to_string()))?;
        Ok(reply.is_some())
    }

    async fn unlock(&self, resource: &str, token: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let deleted: i64 = unlock_script()
            .key(resource)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockstepError::lock_backend(&self.endpoint, e.to_string()))?;
        Ok(deleted == 1)
    }
}
