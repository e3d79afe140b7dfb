//! In-memory implementations of every port. They back the unit and
//! integration tests and keep the same contracts as the real adapters.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::{
    Country, GatewayPriority, NewTransaction, Transaction, TransactionStatus, User, UserAccount,
};
use crate::gateways::{GatewayError, PaymentProcessor};
use crate::ports::{
    BrokerError, EventBroker, KeyValueStore, RepositoryError, RepositoryResult, StoreError,
    StoreResult, TransactionRepository,
};

// ---------------- Repository ----------------

#[derive(Default)]
struct RepositoryState {
    transactions: BTreeMap<i64, Transaction>,
    next_id: i64,
    users: HashMap<i64, User>,
    accounts: HashMap<i64, UserAccount>,
    priorities: Vec<GatewayPriority>,
    fail_balance_updates: bool,
    fail_transaction_inserts: bool,
    transaction_reads: usize,
    user_reads: usize,
}

#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<RepositoryState>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user in `country` with an account holding `balance`.
    pub fn add_user(&self, user_id: i64, country: Country, balance: BigDecimal) {
        let mut state = self.state.lock().unwrap();
        let currency = country.currency.clone();
        state.users.insert(
            user_id,
            User {
                id: user_id,
                username: format!("user{}", user_id),
                email: format!("user{}@example.com", user_id),
                country,
            },
        );
        state.accounts.insert(
            user_id,
            UserAccount {
                id: user_id,
                user_id,
                balance,
                currency,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn add_gateway_priority(&self, priority: GatewayPriority) {
        self.state.lock().unwrap().priorities.push(priority);
    }

    /// Make every subsequent `update_user_balance` fail.
    pub fn set_fail_balance_updates(&self, fail: bool) {
        self.state.lock().unwrap().fail_balance_updates = fail;
    }

    /// Make every subsequent `create_transaction` fail.
    pub fn set_fail_transaction_inserts(&self, fail: bool) {
        self.state.lock().unwrap().fail_transaction_inserts = fail;
    }

    pub fn balance(&self, user_id: i64) -> Option<BigDecimal> {
        self.state
            .lock()
            .unwrap()
            .accounts
            .get(&user_id)
            .map(|a| a.balance.clone())
    }

    pub fn transaction(&self, id: i64) -> Option<Transaction> {
        self.state.lock().unwrap().transactions.get(&id).cloned()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.state
            .lock()
            .unwrap()
            .transactions
            .values()
            .cloned()
            .collect()
    }

    /// Number of `get_transaction_by_id` calls served.
    pub fn transaction_reads(&self) -> usize {
        self.state.lock().unwrap().transaction_reads
    }

    pub fn user_reads(&self) -> usize {
        self.state.lock().unwrap().user_reads
    }
}

#[async_trait]
impl TransactionRepository for InMemoryRepository {
    async fn create_transaction(&self, tx: NewTransaction) -> RepositoryResult<Transaction> {
        let mut state = self.state.lock().unwrap();
        if state.fail_transaction_inserts {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        state.next_id += 1;
        let transaction = Transaction::from_new(state.next_id, tx, Utc::now());
        state
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn get_transaction_by_id(&self, id: i64) -> RepositoryResult<Transaction> {
        let mut state = self.state.lock().unwrap();
        state.transaction_reads += 1;
        state
            .transactions
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))
    }

    async fn update_transaction_status(
        &self,
        id: i64,
        status: TransactionStatus,
    ) -> RepositoryResult<bool> {
        let mut state = self.state.lock().unwrap();
        let transaction = state
            .transactions
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?;
        if transaction.status != TransactionStatus::Pending {
            return Ok(false);
        }
        transaction.status = status;
        Ok(true)
    }

    async fn get_user_by_id(&self, user_id: i64) -> RepositoryResult<User> {
        let mut state = self.state.lock().unwrap();
        state.user_reads += 1;
        state
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("user {}", user_id)))
    }

    async fn get_user_account(&self, user_id: i64) -> RepositoryResult<UserAccount> {
        self.state
            .lock()
            .unwrap()
            .accounts
            .get(&user_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("account for user {}", user_id)))
    }

    async fn update_user_balance(&self, user_id: i64, delta: &BigDecimal) -> RepositoryResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_balance_updates {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        let account = state
            .accounts
            .get_mut(&user_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("account for user {}", user_id)))?;
        let updated = &account.balance + delta;
        if updated < BigDecimal::from(0) {
            return Err(RepositoryError::InsufficientBalance(user_id));
        }
        account.balance = updated;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn get_gateway_priorities(
        &self,
        country_id: i64,
    ) -> RepositoryResult<Vec<GatewayPriority>> {
        let state = self.state.lock().unwrap();
        let mut priorities: Vec<GatewayPriority> = state
            .priorities
            .iter()
            .filter(|p| p.country_id == country_id && p.is_active)
            .cloned()
            .collect();
        priorities.sort_by_key(|p| p.priority);
        Ok(priorities)
    }
}

// ---------------- Key-value store ----------------

#[derive(Default)]
struct StoreState {
    entries: HashMap<String, (String, Option<Instant>)>,
    unavailable: bool,
}

impl StoreState {
    fn live(&mut self, key: &str) -> Option<&mut (String, Option<Instant>)> {
        let expired = matches!(
            self.entries.get(key),
            Some((_, Some(deadline))) if *deadline <= Instant::now()
        );
        if expired {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable {
            return Err(StoreError::Unavailable("in-memory store switched off".to_string()));
        }
        Ok(())
    }
}

/// TTL-aware store driven by `tokio::time`, so paused-clock tests can
/// advance through windows and leases.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every command fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().unwrap().live(key).is_some()
    }

    /// Remaining lifetime of `key`, `None` when absent or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let mut state = self.state.lock().unwrap();
        state
            .live(key)
            .and_then(|(_, deadline)| *deadline)
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.check()?;
        Ok(state.live(key).map(|(value, _)| value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check()?;
        state.entries.insert(
            key.to_string(),
            (value.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut state = self.state.lock().unwrap();
        state.check()?;
        let current = match state.live(key) {
            Some((value, _)) => value
                .parse::<i64>()
                .map_err(|_| StoreError::Command(format!("{} is not an integer", key)))?,
            None => 0,
        };
        let next = current + 1;
        match state.live(key) {
            Some((value, _)) => *value = next.to_string(),
            None => {
                state
                    .entries
                    .insert(key.to_string(), (next.to_string(), None));
            }
        }
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check()?;
        if let Some((_, deadline)) = state.live(key) {
            *deadline = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check()?;
        state.entries.remove(key);
        Ok(())
    }

    async fn set_nx_px(&self, key: &str, value: &str, lease: Duration) -> StoreResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.check()?;
        if state.live(key).is_some() {
            return Ok(false);
        }
        state.entries.insert(
            key.to_string(),
            (value.to_string(), Some(Instant::now() + lease)),
        );
        Ok(true)
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.check()?;
        let owned = matches!(state.live(key), Some((value, _)) if value == expected);
        if owned {
            state.entries.remove(key);
        }
        Ok(owned)
    }
}

// ---------------- Broker ----------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

/// Broker that keeps what it was sent. Failures can be queued up.
#[derive(Clone, Default)]
pub struct RecordingBroker {
    messages: Arc<Mutex<Vec<RecordedMessage>>>,
    failures_remaining: Arc<AtomicU32>,
    always_fail: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
}

impl RecordingBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` sends.
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn set_always_fail(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<RecordedMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// Every send call, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventBroker for RecordingBroker {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(BrokerError::Write("broker down".to_string()));
        }
        let queued = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if queued.is_ok() {
            return Err(BrokerError::Write("transient broker failure".to_string()));
        }
        self.messages.lock().unwrap().push(RecordedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), BrokerError> {
        Ok(())
    }
}

// ---------------- Payment processor ----------------

struct StubState {
    name: String,
    available: AtomicBool,
    fail_requests: AtomicBool,
    probes: AtomicUsize,
    sessions: AtomicUsize,
    withdrawals: AtomicUsize,
    latency: Mutex<Option<Duration>>,
}

/// Processor double with switchable liveness and optional call latency.
#[derive(Clone)]
pub struct StubProcessor {
    state: Arc<StubState>,
}

impl StubProcessor {
    pub fn new(name: &str) -> Self {
        Self {
            state: Arc::new(StubState {
                name: name.to_string(),
                available: AtomicBool::new(true),
                fail_requests: AtomicBool::new(false),
                probes: AtomicUsize::new(0),
                sessions: AtomicUsize::new(0),
                withdrawals: AtomicUsize::new(0),
                latency: Mutex::new(None),
            }),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.state.available.store(available, Ordering::SeqCst);
    }

    /// Make session generation and withdrawal registration fail.
    pub fn set_fail_requests(&self, fail: bool) {
        self.state.fail_requests.store(fail, Ordering::SeqCst);
    }

    /// Delay session and withdrawal calls, widening the critical section.
    pub fn set_latency(&self, latency: Duration) {
        *self.state.latency.lock().unwrap() = Some(latency);
    }

    pub fn probe_count(&self) -> usize {
        self.state.probes.load(Ordering::SeqCst)
    }

    pub fn session_count(&self) -> usize {
        self.state.sessions.load(Ordering::SeqCst)
    }

    pub fn withdrawal_count(&self) -> usize {
        self.state.withdrawals.load(Ordering::SeqCst)
    }

    async fn simulate_call(&self) -> Result<(), GatewayError> {
        let latency = *self.state.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.state.fail_requests.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                gateway: self.state.name.clone(),
                reason: "stub configured to fail".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProcessor for StubProcessor {
    fn name(&self) -> &str {
        &self.state.name
    }

    async fn check_availability(&self) -> Result<(), GatewayError> {
        self.state.probes.fetch_add(1, Ordering::SeqCst);
        if self.state.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::NotResponding {
                gateway: self.state.name.clone(),
                reason: "probe failed".to_string(),
            })
        }
    }

    async fn generate_deposit_session(
        &self,
        transaction: &Transaction,
        callback_url: &str,
    ) -> Result<Value, GatewayError> {
        self.simulate_call().await?;
        self.state.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "gateway": self.state.name,
            "transaction_id": transaction.id,
            "callback_url": callback_url,
        }))
    }

    async fn register_withdrawal(
        &self,
        _transaction: &Transaction,
        _callback_url: &str,
        _receiving_account: &str,
    ) -> Result<(), GatewayError> {
        self.simulate_call().await?;
        self.state.withdrawals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_store_entries_expire() {
        let store = InMemoryStore::new();
        store
            .set_ex("k", "v", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lock_primitives_respect_owner() {
        let store = InMemoryStore::new();
        let lease = Duration::from_secs(10);
        assert!(store.set_nx_px("lock", "a", lease).await.unwrap());
        assert!(!store.set_nx_px("lock", "b", lease).await.unwrap());
        assert!(!store.del_if_eq("lock", "b").await.unwrap());
        assert!(store.del_if_eq("lock", "a").await.unwrap());
        assert!(store.set_nx_px("lock", "b", lease).await.unwrap());
    }

    #[tokio::test]
    async fn test_repository_rejects_overdraft() {
        let repo = InMemoryRepository::new();
        repo.add_user(
            1,
            Country {
                id: 1,
                name: "Kenya".to_string(),
                code: "KE".to_string(),
                currency: "KES".to_string(),
            },
            BigDecimal::from(50),
        );
        let result = repo.update_user_balance(1, &BigDecimal::from(-60)).await;
        assert!(matches!(result, Err(RepositoryError::InsufficientBalance(1))));
        assert_eq!(repo.balance(1), Some(BigDecimal::from(50)));
    }

    #[tokio::test]
    async fn test_broker_fails_queued_sends() {
        let broker = RecordingBroker::new();
        broker.fail_next(1);
        assert!(broker.send("t", "1", b"x").await.is_err());
        assert!(broker.send("t", "1", b"x").await.is_ok());
        assert_eq!(broker.attempts(), 2);
        assert_eq!(broker.messages().len(), 1);
    }
}
