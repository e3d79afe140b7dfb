//! Fixed-window request counter shared by every instance through the store.

use std::sync::Arc;
use std::time::Duration;

use crate::ports::{KeyValueStore, StoreResult};

const SERVICE_NAME: &str = "payment-gateways";

#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    settings: RateLimitSettings,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: RateLimitSettings) -> Self {
        Self { store, settings }
    }

    pub fn key_for(caller: &str) -> String {
        format!("ratelimit_{}:{}", SERVICE_NAME, caller)
    }

    /// Count this request and report whether it fits the caller's window.
    ///
    /// INCR and EXPIRE are separate round trips: a crash in between leaves a
    /// counter without expiry. The window starts at the caller's first hit,
    /// so up to twice the limit can pass around a boundary.
    pub async fn allow(&self, caller: &str) -> StoreResult<bool> {
        let key = Self::key_for(caller);

        let count = self.store.incr(&key).await?;
        if count == 1 {
            self.store.expire(&key, self.settings.window).await?;
        }

        let allowed = count <= i64::from(self.settings.max_requests);
        if !allowed {
            tracing::debug!(caller, count, "rate limit exceeded");
        }
        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;

    fn limiter(store: &InMemoryStore) -> RateLimiter {
        RateLimiter::new(
            Arc::new(store.clone()),
            RateLimitSettings {
                max_requests: 3,
                window: Duration::from_secs(60),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_plus_one_is_denied_then_next_window_allows() {
        let store = InMemoryStore::new();
        let limiter = limiter(&store);

        for _ in 0..3 {
            assert!(limiter.allow("1").await.unwrap());
        }
        assert!(!limiter.allow("1").await.unwrap());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.allow("1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_callers_are_counted_separately() {
        let store = InMemoryStore::new();
        let limiter = limiter(&store);

        for _ in 0..3 {
            assert!(limiter.allow("1").await.unwrap());
        }
        assert!(limiter.allow("2").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_attached_on_first_hit_only() {
        let store = InMemoryStore::new();
        let limiter = limiter(&store);
        let key = RateLimiter::key_for("1");

        limiter.allow("1").await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.allow("1").await.unwrap();

        // Second hit must not push the window out.
        let ttl = store.ttl(&key).unwrap();
        assert!(ttl <= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        assert!(limiter(&store).allow("1").await.is_err());
    }
}
