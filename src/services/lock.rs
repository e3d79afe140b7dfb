//! Store-backed mutual exclusion keyed by a transaction fingerprint.

use bigdecimal::BigDecimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use uuid::Uuid;

use crate::domain::TransactionType;
use crate::ports::{KeyValueStore, StoreError};
use crate::validation::AMOUNT_MAX_SCALE;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("transaction already in progress")]
    AlreadyInProgress,

    #[error("lock store error: {0}")]
    Store(#[from] StoreError),
}

/// Lock key for one logical transaction. Amounts are rendered at a fixed
/// scale so `100` and `100.00` collide.
pub fn fingerprint(
    kind: TransactionType,
    amount: &BigDecimal,
    user_id: i64,
    currency: &str,
    gateway_name: &str,
) -> String {
    format!(
        "{}-trx_{}_{}_{}_{}",
        kind,
        amount.with_scale(AMOUNT_MAX_SCALE),
        user_id,
        currency,
        gateway_name
    )
}

#[derive(Debug, Clone, Copy)]
pub struct LockSettings {
    pub lease: Duration,
    /// Upper bound on a single acquisition attempt.
    pub acquire_timeout: Duration,
}

#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn KeyValueStore>,
    settings: LockSettings,
}

impl LockManager {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: LockSettings) -> Self {
        Self { store, settings }
    }

    /// One attempt, never queued. A timed-out or failed store call is not
    /// treated as acquired.
    pub async fn acquire(&self, key: &str) -> Result<LockGuard, LockError> {
        let token = Uuid::new_v4().to_string();

        let acquired = match timeout(
            self.settings.acquire_timeout,
            self.store.set_nx_px(key, &token, self.settings.lease),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(StoreError::Timeout(self.settings.acquire_timeout).into()),
        };

        if !acquired {
            tracing::debug!(lock = key, "lock held by another request");
            return Err(LockError::AlreadyInProgress);
        }

        Ok(LockGuard {
            store: Arc::clone(&self.store),
            key: key.to_string(),
            token,
            released: false,
        })
    }
}

/// Held lock. Call `release` on every path; dropping an unreleased guard
/// schedules a best-effort release in the background.
pub struct LockGuard {
    store: Arc<dyn KeyValueStore>,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns `false` if the lease had already lapsed and the key no longer
    /// belonged to this holder.
    pub async fn release(mut self) -> Result<bool, StoreError> {
        self.released = true;
        let owned = self.store.del_if_eq(&self.key, &self.token).await?;
        if !owned {
            tracing::warn!(lock = %self.key, "lock lease expired before release");
        }
        Ok(owned)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        handle.spawn(async move {
            if let Err(e) = store.del_if_eq(&key, &token).await {
                tracing::warn!(lock = %key, error = %e, "failed to release dropped lock");
            }
        });
    }
}
