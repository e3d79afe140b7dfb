#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use payrail_core::adapters::memory::{
    InMemoryRepository, InMemoryStore, RecordingBroker, StubProcessor,
};
use payrail_core::domain::Country;
use payrail_core::gateways::{GatewayRegistry, GatewaySelector};
use payrail_core::health::HealthService;
use payrail_core::schemas::{CallbackRequest, DepositRequest, WithdrawalRequest};
use payrail_core::services::{
    Cache, DataMasker, LockManager, LockSettings, PaymentService, Publisher, PublisherSettings,
    RateLimitSettings, RateLimiter,
};
use payrail_core::AppState;

pub const MASKING_KEY: [u8; 32] = [7u8; 32];
pub const BASE_URL: &str = "http://payrail.test";

pub fn united_states() -> Country {
    Country {
        id: 1,
        name: "United States".to_string(),
        code: "US".to_string(),
        currency: "USD".to_string(),
    }
}

pub fn germany() -> Country {
    Country {
        id: 2,
        name: "Germany".to_string(),
        code: "DE".to_string(),
        currency: "EUR".to_string(),
    }
}

pub fn money(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

pub fn publisher_settings() -> PublisherSettings {
    PublisherSettings {
        max_attempts: 3,
        retry_backoff: Duration::from_millis(10),
        attempt_timeout: Duration::from_secs(1),
        failure_threshold: 3,
        cooldown: Duration::from_secs(30),
    }
}

/// Every component wired against in-memory doubles.
pub struct TestHarness {
    pub repo: InMemoryRepository,
    pub store: InMemoryStore,
    pub broker: RecordingBroker,
    pub stripe: StubProcessor,
    pub paypal: StubProcessor,
    pub service: PaymentService,
    pub rate_limiter: RateLimiter,
}

impl TestHarness {
    pub fn new() -> Self {
        let repo = InMemoryRepository::new();
        repo.add_user(1, united_states(), money("50"));
        repo.add_user(2, germany(), money("200"));

        let store = InMemoryStore::new();
        let broker = RecordingBroker::new();
        let stripe = StubProcessor::new("stripe");
        let paypal = StubProcessor::new("paypal");
        let registry = GatewayRegistry::new(Arc::new(stripe.clone()))
            .register(Arc::new(paypal.clone()));

        let store_port = Arc::new(store.clone());
        let service = PaymentService::new(
            Arc::new(repo.clone()),
            GatewaySelector::new(Arc::new(repo.clone()), registry),
            LockManager::new(
                store_port.clone(),
                LockSettings {
                    lease: Duration::from_secs(10),
                    acquire_timeout: Duration::from_secs(2),
                },
            ),
            Cache::new(store_port.clone(), Duration::from_secs(300)),
            Publisher::new(
                Arc::new(broker.clone()),
                DataMasker::from_bytes(&MASKING_KEY).unwrap(),
                publisher_settings(),
            ),
            BASE_URL.to_string(),
        );
        let rate_limiter = RateLimiter::new(
            store_port,
            RateLimitSettings {
                max_requests: 3,
                window: Duration::from_secs(60),
            },
        );

        Self {
            repo,
            store,
            broker,
            stripe,
            paypal,
            service,
            rate_limiter,
        }
    }

    pub fn app_state(&self, health: HealthService) -> AppState {
        AppState {
            payments: self.service.clone(),
            rate_limiter: self.rate_limiter.clone(),
            health,
        }
    }

    pub fn masker(&self) -> DataMasker {
        DataMasker::from_bytes(&MASKING_KEY).unwrap()
    }
}

pub fn deposit(user_id: i64, amount: &str, currency: &str) -> DepositRequest {
    DepositRequest {
        amount: money(amount),
        user_id,
        currency: currency.to_string(),
    }
}

pub fn withdrawal(user_id: i64, amount: &str, gateway: &str) -> WithdrawalRequest {
    WithdrawalRequest {
        amount: money(amount),
        user_id,
        payment_gateway_name: gateway.to_string(),
        receiving_account: "acct_0042".to_string(),
        authentication_code: "918273".to_string(),
    }
}

pub fn callback(transaction_id: i64, status: &str) -> CallbackRequest {
    CallbackRequest {
        transaction_id,
        status: status.to_string(),
    }
}
