//! Cache-aside helpers over the shared store. The cache never reads the
//! system of record itself; callers fall back on a miss.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::ports::{KeyValueStore, StoreError};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(#[from] StoreError),

    #[error("cache entry {key} could not be (de)serialised: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub fn transaction_key(id: i64) -> String {
    format!("transaction:{}", id)
}

pub fn user_key(id: i64) -> String {
    format!("user:{}", id)
}

#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl Cache {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// `Ok(None)` is a miss; a blob that no longer decodes is an error.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| CacheError::Serialization {
                key: key.to_string(),
                source,
            })
    }

    pub async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value).map_err(|source| CacheError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.store.set_ex(key, &raw, self.ttl).await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.del(key).await?;
        Ok(())
    }

    /// `save` for paths where the cache is best-effort: failures become warnings.
    pub async fn save_or_warn<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.save(key, value).await {
            tracing::warn!(cache_key = key, error = %e, "failed to populate cache");
        }
    }

    pub async fn delete_or_warn(&self, key: &str) {
        if let Err(e) = self.delete(key).await {
            tracing::warn!(cache_key = key, error = %e, "failed to invalidate cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::domain::Country;

    fn country() -> Country {
        Country {
            id: 1,
            name: "United States".to_string(),
            code: "US".to_string(),
            currency: "USD".to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_then_get() {
        let store = InMemoryStore::new();
        let cache = Cache::new(Arc::new(store.clone()), Duration::from_secs(300));

        cache.save("country:1", &country()).await.unwrap();
        let cached: Option<Country> = cache.get("country:1").await.unwrap();
        assert_eq!(cached, Some(country()));
    }

    #[tokio::test]
    async fn test_miss_is_not_an_error() {
        let cache = Cache::new(Arc::new(InMemoryStore::new()), Duration::from_secs(300));
        let cached: Option<Country> = cache.get("country:9").await.unwrap();
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_distinct_from_miss() {
        let store = InMemoryStore::new();
        store
            .set_ex("country:1", "not json", Duration::from_secs(5))
            .await
            .unwrap();
        let cache = Cache::new(Arc::new(store), Duration::from_secs(300));

        let result = cache.get::<Country>("country:1").await;
        assert!(matches!(result, Err(CacheError::Serialization { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let store = InMemoryStore::new();
        let cache = Cache::new(Arc::new(store), Duration::from_secs(300));
        cache.save(&user_key(1), &country()).await.unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(cache.get::<Country>(&user_key(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_best_effort_writes_survive_outage() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        let cache = Cache::new(Arc::new(store), Duration::from_secs(300));

        cache.save_or_warn(&transaction_key(1), &country()).await;
        cache.delete_or_warn(&transaction_key(1)).await;
        assert!(cache.get::<Country>(&transaction_key(1)).await.is_err());
    }
}
