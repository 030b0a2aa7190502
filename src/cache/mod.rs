//! Cache store abstraction shared by all process instances.
//!
//! The store memoizes adapter results under per-entry expiration. Expiration
//! is lazy: an expired entry is treated as absent on read, not actively
//! purged. Both operations are independently fallible without aborting the
//! caller; the orchestrator absorbs every [`CacheError`].

pub mod key;
pub mod memory;

#[cfg(feature = "redis-store")]
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CacheConfig;
use crate::error::CacheError;

pub use key::CacheKey;
pub use memory::InMemoryStore;

#[cfg(feature = "redis-store")]
pub use redis::RedisStore;

/// A cached adapter result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Opaque serialized payload
    pub value: Value,

    /// Unix timestamp (seconds) at which the entry was written
    pub stored_at: i64,

    /// Time to live in seconds
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: chrono::Utc::now().timestamp(),
            ttl_secs: ttl.as_secs(),
        }
    }

    /// An entry is valid iff `now < stored_at + ttl`.
    pub fn is_valid_at(&self, now: i64) -> bool {
        now < self.stored_at + self.ttl_secs as i64
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(chrono::Utc::now().timestamp())
    }
}

/// Key-value store with per-entry expiration.
///
/// Implementations are a performance optimization, never a correctness
/// dependency: callers must treat a failed read as a miss and a failed
/// write as a no-op.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read an entry. Expired entries may still be returned; validity is
    /// the caller's check (lazy expiration).
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Write an entry, replacing any previous value (last-writer-wins).
    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;
}

/// A store that remembers nothing: every read is a miss, every write a
/// no-op. Selected when caching is disabled by configuration.
pub struct NoopStore;

#[async_trait]
impl CacheStore for NoopStore {
    async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _entry: CacheEntry) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Build the store selected by `config`: the no-op store when caching is
/// disabled, the shared Redis store when a URL is configured (and the
/// `redis-store` feature is enabled), the in-memory store otherwise.
pub async fn store_from_config(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    if !config.enabled {
        return Ok(Arc::new(NoopStore));
    }

    if let Some(url) = &config.redis_url {
        #[cfg(feature = "redis-store")]
        {
            return Ok(Arc::new(redis::RedisStore::connect(url).await?));
        }
        #[cfg(not(feature = "redis-store"))]
        tracing::warn!(
            %url,
            "REDIS_URL is set but the redis-store feature is disabled, using the in-memory store"
        );
    }

    Ok(Arc::new(InMemoryStore::new()))
}
