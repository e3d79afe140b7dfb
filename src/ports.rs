//! Seams between the orchestration core and its collaborators.
//! Each trait has a production adapter and an in-memory double under `adapters`.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{
    GatewayPriority, NewTransaction, Transaction, TransactionStatus, User, UserAccount,
};

// --- Relational store ---

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient balance for user {0}")]
    InsufficientBalance(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Insert a pending transaction and return it with its assigned id.
    async fn create_transaction(&self, tx: NewTransaction) -> RepositoryResult<Transaction>;

    async fn get_transaction_by_id(&self, id: i64) -> RepositoryResult<Transaction>;

    /// Move a pending transaction to `status`. Returns `false` when the row
    /// exists but is no longer pending, so concurrent callbacks apply once.
    async fn update_transaction_status(
        &self,
        id: i64,
        status: TransactionStatus,
    ) -> RepositoryResult<bool>;

    async fn get_user_by_id(&self, user_id: i64) -> RepositoryResult<User>;

    async fn get_user_account(&self, user_id: i64) -> RepositoryResult<UserAccount>;

    /// Atomically add `delta` (negative for a debit) to the user's balance.
    /// A debit that would take the balance below zero is rejected with
    /// `InsufficientBalance`.
    async fn update_user_balance(&self, user_id: i64, delta: &BigDecimal) -> RepositoryResult<()>;

    /// Active priorities for a country, rank ascending.
    async fn get_gateway_priorities(&self, country_id: i64)
        -> RepositoryResult<Vec<GatewayPriority>>;
}

// --- Shared key-value store ---

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("store command failed: {0}")]
    Command(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Increment and return the new value. Missing keys start at zero.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()>;

    async fn del(&self, key: &str) -> StoreResult<()>;

    /// Set `key` only if absent, with a lease. Returns whether it was set.
    async fn set_nx_px(&self, key: &str, value: &str, lease: Duration) -> StoreResult<bool>;

    /// Delete `key` only if it still holds `expected`. Returns whether it was deleted.
    async fn del_if_eq(&self, key: &str, expected: &str) -> StoreResult<bool>;
}

// --- Message broker ---

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker write failed: {0}")]
    Write(String),

    #[error("broker write timed out")]
    Timeout,
}

#[async_trait]
pub trait EventBroker: Send + Sync {
    /// Append `payload` to `topic`, partitioned by `key`.
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Wait for buffered messages to be delivered. Called on shutdown.
    async fn flush(&self, timeout: Duration) -> Result<(), BrokerError>;
}
