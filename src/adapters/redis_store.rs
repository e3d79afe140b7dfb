//! Redis implementation of KeyValueStore.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;

use crate::ports::{KeyValueStore, StoreError, StoreResult};

/// Deletes the key only while it still holds the caller's token.
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Command(e.to_string())
        }
    }
}

/// One reconnecting multiplexed connection shared by every clone.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    manager: Arc<OnceCell<ConnectionManager>>,
    op_timeout: Duration,
}

impl RedisStore {
    /// Parses the URL only; the connection is opened on first use.
    pub fn new(redis_url: &str, op_timeout: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            manager: Arc::new(OnceCell::new()),
            op_timeout,
        })
    }

    async fn connection(&self) -> redis::RedisResult<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(manager.clone())
    }

    /// Round-trip a PING within the command timeout.
    pub async fn ping(&self) -> StoreResult<()> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            redis::cmd("PING").query_async::<_, String>(&mut conn).await
        })
        .await
        .map(|_| ())
    }

    async fn bounded<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            conn.get::<_, Option<String>>(key).await
        })
        .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("PX")
                .arg(ttl.as_millis() as u64)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            conn.incr::<_, _, i64>(key, 1).await
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            redis::cmd("PEXPIRE")
                .arg(key)
                .arg(ttl.as_millis() as u64)
                .query_async::<_, i64>(&mut conn)
                .await
        })
        .await
        .map(|_| ())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            conn.del::<_, i64>(key).await
        })
        .await
        .map(|_| ())
    }

    async fn set_nx_px(&self, key: &str, value: &str, lease: Duration) -> StoreResult<bool> {
        let reply = self
            .bounded(async {
                let mut conn = self.connection().await?;
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(lease.as_millis() as u64)
                    .query_async::<_, Option<String>>(&mut conn)
                    .await
            })
            .await?;
        Ok(reply.is_some())
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let deleted = self
            .bounded(async {
                let mut conn = self.connection().await?;
                redis::Script::new(COMPARE_AND_DELETE)
                    .key(key)
                    .arg(expected)
                    .invoke_async::<_, i64>(&mut conn)
                    .await
            })
            .await?;
        Ok(deleted == 1)
    }
}
