use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::adapters::RedisStore;
use crate::services::Publisher;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyStatus>,
}

impl HealthResponse {
    pub fn is_unhealthy(&self) -> bool {
        self.status == "unhealthy"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn healthy(start: Instant) -> Self {
        DependencyStatus::Healthy {
            status: "healthy".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn unhealthy(error: impl Into<String>) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.into(),
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    async fn check(&self) -> DependencyStatus;
}

pub struct PostgresChecker {
    pool: sqlx::PgPool,
}

impl PostgresChecker {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DependencyChecker for PostgresChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e.to_string()),
        }
    }
}

pub struct RedisChecker {
    store: RedisStore,
}

impl RedisChecker {
    pub fn new(store: RedisStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DependencyChecker for RedisChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.store.ping().await {
            Ok(()) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e.to_string()),
        }
    }
}

/// Reports the event publisher's circuit breaker.
pub struct BreakerChecker {
    publisher: Publisher,
}

impl BreakerChecker {
    pub fn new(publisher: Publisher) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl DependencyChecker for BreakerChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.publisher.circuit_state() {
            "closed" => DependencyStatus::healthy(start),
            state => DependencyStatus::unhealthy(format!("circuit breaker {}", state)),
        }
    }
}

struct Dependency {
    name: String,
    critical: bool,
    checker: Arc<dyn DependencyChecker>,
}

/// Runs every registered check concurrently, each bounded by a timeout.
#[derive(Clone)]
pub struct HealthService {
    dependencies: Arc<Vec<Dependency>>,
    start_time: Instant,
}

impl HealthService {
    pub fn builder() -> HealthServiceBuilder {
        HealthServiceBuilder {
            dependencies: Vec::new(),
        }
    }

    pub async fn check(&self) -> HealthResponse {
        let checks = self.dependencies.iter().map(|dep| async move {
            let status = timeout(CHECK_TIMEOUT, dep.checker.check())
                .await
                .unwrap_or_else(|_| DependencyStatus::unhealthy("timeout"));
            (dep, status)
        });
        let results = futures::future::join_all(checks).await;

        let overall = determine_overall_status(
            results
                .iter()
                .map(|(dep, status)| (dep.critical, status)),
        );
        let dependencies = results
            .into_iter()
            .map(|(dep, status)| (dep.name.clone(), status))
            .collect();

        HealthResponse {
            status: overall,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            dependencies,
        }
    }
}

pub struct HealthServiceBuilder {
    dependencies: Vec<Dependency>,
}

impl HealthServiceBuilder {
    /// A failing critical dependency makes the service unhealthy; any other
    /// failure only degrades it.
    pub fn with(
        mut self,
        name: &str,
        critical: bool,
        checker: Arc<dyn DependencyChecker>,
    ) -> Self {
        self.dependencies.push(Dependency {
            name: name.to_string(),
            critical,
            checker,
        });
        self
    }

    pub fn build(self) -> HealthService {
        HealthService {
            dependencies: Arc::new(self.dependencies),
            start_time: Instant::now(),
        }
    }
}

fn determine_overall_status<'a>(
    results: impl Iterator<Item = (bool, &'a DependencyStatus)>,
) -> String {
    let mut has_critical_failure = false;
    let mut has_non_critical_failure = false;

    for (critical, status) in results {
        if matches!(status, DependencyStatus::Unhealthy { .. }) {
            if critical {
                has_critical_failure = true;
            } else {
                has_non_critical_failure = true;
            }
        }
    }

    if has_critical_failure {
        "unhealthy".to_string()
    } else if has_non_critical_failure {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(bool);

    #[async_trait]
    impl DependencyChecker for Fixed {
        async fn check(&self) -> DependencyStatus {
            if self.0 {
                DependencyStatus::healthy(Instant::now())
            } else {
                DependencyStatus::unhealthy("down")
            }
        }
    }

    #[tokio::test]
    async fn test_all_healthy() {
        let health = HealthService::builder()
            .with("postgres", true, Arc::new(Fixed(true)))
            .with("redis", false, Arc::new(Fixed(true)))
            .build();
        let response = health.check().await;
        assert_eq!(response.status, "healthy");
        assert_eq!(response.dependencies.len(), 2);
    }

    #[tokio::test]
    async fn test_non_critical_failure_degrades() {
        let health = HealthService::builder()
            .with("postgres", true, Arc::new(Fixed(true)))
            .with("redis", false, Arc::new(Fixed(false)))
            .build();
        assert_eq!(health.check().await.status, "degraded");
    }

    #[tokio::test]
    async fn test_critical_failure_is_unhealthy() {
        let health = HealthService::builder()
            .with("postgres", true, Arc::new(Fixed(false)))
            .with("redis", false, Arc::new(Fixed(true)))
            .build();
        let response = health.check().await;
        assert!(response.is_unhealthy());
    }
}
