//! In-memory cache store (non-shared, single-instance deployments and tests).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CacheError;

use super::{CacheEntry, CacheStore};

#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included (lazy expiration).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn set_then_get_returns_entry() {
        let store = InMemoryStore::new();
        let entry = CacheEntry::new(json!({"city": "Nairobi"}), Duration::from_secs(60));
        assert_ok!(store.set("time:v1:city=nairobi", entry).await);

        let found = store.get("time:v1:city=nairobi").await.unwrap().unwrap();
        assert_eq!(found.value["city"], "Nairobi");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn missing_key_is_absent() {
        let store = InMemoryStore::new();
        assert!(store.get("weather:v1:city=lagos").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn last_writer_wins() {
        let store = InMemoryStore::new();
        let key = "facts:v1:city=paris";
        assert_ok!(
            store
                .set(key, CacheEntry::new(json!(1), Duration::from_secs(60)))
                .await
        );
        assert_ok!(
            store
                .set(key, CacheEntry::new(json!(2), Duration::from_secs(60)))
                .await
        );

        assert_eq!(store.get(key).await.unwrap().unwrap().value, json!(2));
        assert_eq!(store.len().await, 1);
    }
}
