// Redis-backed key-value store
// Author: kelexine (https://github.com/kelexine)

use super::{KeyValueStore, TTL_MISSING};
use crate::config::RedisConfig;
use crate::error::{CacheError, Result};
use crate::utils::logging::redact_url;
use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Keys deleted per `DEL` round trip during pattern invalidation.
const DELETE_BATCH: usize = 500;

/// Shared Redis instance reached through a reconnecting multiplexed connection.
///
/// `ConnectionManager` re-establishes the link on its own after a drop, so a
/// transient outage only fails the commands issued while it lasts.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    command_timeout: Duration,
}

impl RedisStore {
    /// Open a connection to `url`, bounded by the configured connect timeout.
    pub async fn connect(url: &str, config: &RedisConfig) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| CacheError::Store(format!("invalid Redis URL {}: {}", redact_url(url), e)))?;

        let conn = tokio::time::timeout(
            Duration::from_millis(config.connect_timeout_ms),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| CacheError::Store(format!("connection to {} timed out", redact_url(url))))?
        .map_err(|e| CacheError::Store(format!("connection to {} failed: {}", redact_url(url), e)))?;

        info!("Connected to Redis at {}", redact_url(url));

        Ok(Self {
            conn,
            command_timeout: Duration::from_millis(config.command_timeout_ms),
        })
    }

    /// Run one command under the command timeout.
    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = ::redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => Err(CacheError::Store(format!(
                "{} timed out after {}ms",
                op,
                self.command_timeout.as_millis()
            ))),
        }
    }
}

/// Redis answers -2 for missing keys and -1 for keys without expiry; anything
/// below that (older servers, proxies) is reported as missing.
fn normalize_ttl(raw: i64) -> i64 {
    raw.max(TTL_MISSING)
}

fn delete_batches(keys: &[String]) -> std::slice::Chunks<'_, String> {
    keys.chunks(DELETE_BATCH)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded("GET", async move { conn.get::<_, Option<String>>(key).await })
            .await
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        self.bounded("SETEX", async move {
            conn.set_ex::<_, _, ()>(key, value, ttl_seconds).await
        })
        .await
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let remaining = self
            .bounded("TTL", async move { conn.ttl::<_, i64>(key).await })
            .await?;
        Ok(normalize_ttl(remaining))
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        let mut scan_conn = self.conn.clone();
        let keys: Vec<String> = self
            .bounded("SCAN", async move {
                let mut iter = scan_conn.scan_match::<_, String>(pattern).await?;
                let mut keys = Vec::new();
                while let Some(key) = iter.next_item().await {
                    keys.push(key);
                }
                Ok::<_, ::redis::RedisError>(keys)
            })
            .await?;

        if keys.is_empty() {
            debug!("No Redis keys matched {}", pattern);
            return Ok(0);
        }

        let mut deleted = 0u64;
        for batch in delete_batches(&keys) {
            let mut conn = self.conn.clone();
            let batch = batch.to_vec();
            deleted += self
                .bounded("DEL", async move { conn.del::<_, u64>(batch).await })
                .await?;
        }

        debug!("Deleted {} Redis keys matching {}", deleted, pattern);
        Ok(deleted)
    }
}
