//! Redis store backend
//!
//! Lists map onto `LPUSH`/`LTRIM`/`LRANGE`, snapshots onto `SET ... EX`.
//! Every command is bounded by the configured command timeout.

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};
use queuewatch_core::{MetricsStore, StoreError, StoreResult};
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Optional prefix prepended to every key as `prefix:key`
    pub key_prefix: Option<String>,
    pub command_timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: None,
            command_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Pooled Redis [`MetricsStore`]
pub struct RedisStore {
    pool: Pool,
    config: RedisStoreConfig,
}

impl RedisStore {
    /// Connect with default settings
    pub async fn new(url: impl Into<String>) -> StoreResult<Self> {
        Self::with_config(RedisStoreConfig::new(url)).await
    }

    /// Create the pool and verify connectivity with `PING`
    pub async fn with_config(config: RedisStoreConfig) -> StoreResult<Self> {
        let pool = PoolConfig::from_url(&config.url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| {
                StoreError::ConnectionFailed(format!("Failed to create connection pool: {}", e))
            })?;

        let store = Self { pool, config };
        let mut conn = store.connection().await?;
        store
            .bounded(redis::cmd("PING").query_async::<String>(&mut *conn))
            .await
            .map_err(|e| StoreError::ConnectionFailed(format!("PING failed: {}", e)))?;

        debug!("Redis store connected to {}", store.config.url);
        Ok(store)
    }

    async fn connection(&self) -> StoreResult<Connection> {
        tokio::time::timeout(self.config.command_timeout, self.pool.get())
            .await
            .map_err(|_| StoreError::Timeout(self.config.command_timeout))?
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))
    }

    async fn bounded<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.config.command_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.config.command_timeout))?
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn key(&self, key: &str) -> String {
        match &self.config.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl MetricsStore for RedisStore {
    async fn push_front(&self, key: &str, value: String, max_len: usize) -> StoreResult<()> {
        let key = self.key(key);
        let stop = max_len.max(1) as isize - 1;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .lpush(&key, value)
            .ignore()
            .ltrim(&key, 0, stop)
            .ignore();

        let mut conn = self.connection().await?;
        self.bounded(pipe.query_async::<()>(&mut *conn)).await
    }

    async fn range(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        let key = self.key(key);
        let mut conn = self.connection().await?;
        self.bounded(conn.lrange::<_, Vec<String>>(&key, start, stop))
            .await
    }

    async fn trim(&self, key: &str, len: usize) -> StoreResult<()> {
        let key = self.key(key);
        let mut conn = self.connection().await?;
        if len == 0 {
            return self.bounded(conn.del::<_, ()>(&key)).await;
        }
        self.bounded(conn.ltrim::<_, ()>(&key, 0, len as isize - 1))
            .await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let key = self.key(key);
        let mut conn = self.connection().await?;
        self.bounded(conn.del::<_, ()>(&key)).await
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        let key = self.key(key);
        let seconds = ttl.as_secs().max(1);
        let mut conn = self.connection().await?;
        self.bounded(conn.set_ex::<_, _, ()>(&key, value, seconds))
            .await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = self.key(key);
        let mut conn = self.connection().await?;
        self.bounded(conn.get::<_, Option<String>>(&key)).await
    }
}
