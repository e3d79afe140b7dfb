use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::gateways::GatewayKind;
use crate::services::{LockSettings, PublisherSettings, RateLimitSettings};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    /// Only read when built with the `kafka` feature; otherwise events go to `LogBroker`.
    pub kafka_broker_url: String,
    pub api_base_url: String,
    pub masking_key: String,
    pub rate_limit_requests: u32,
    pub rate_limit_window_secs: u64,
    pub lock_lease_ms: u64,
    pub store_timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub publish_max_attempts: u32,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_secs: u64,
    pub shutdown_grace_secs: u64,
    pub request_timeout_secs: u64,
    pub default_gateway: String,
    pub stripe_health_url: Option<String>,
    pub paypal_health_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source. Missing optional values take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} must be set", name))
        };

        let api_base_url = required("API_BASE_URL")?;
        url::Url::parse(&api_base_url)
            .with_context(|| format!("API_BASE_URL is not a valid URL: {}", api_base_url))?;

        let default_gateway = lookup("DEFAULT_GATEWAY").unwrap_or_else(|| "stripe".to_string());
        GatewayKind::from_str(&default_gateway)
            .map_err(|_| anyhow::anyhow!("DEFAULT_GATEWAY names an unknown gateway: {}", default_gateway))?;

        Ok(Config {
            server_port: parse_or(&lookup, "SERVER_PORT", 3000)?,
            database_url: required("DATABASE_URL")?,
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            kafka_broker_url: lookup("KAFKA_BROKER_URL")
                .unwrap_or_else(|| "localhost:9092".to_string()),
            api_base_url,
            masking_key: required("MASKING_KEY")?,
            rate_limit_requests: parse_or(&lookup, "RATE_LIMIT_REQUESTS", 3)?,
            rate_limit_window_secs: positive_or(&lookup, "RATE_LIMIT_WINDOW_SECS", 60)?,
            lock_lease_ms: positive_or(&lookup, "LOCK_LEASE_MS", 10_000)?,
            store_timeout_ms: positive_or(&lookup, "STORE_TIMEOUT_MS", 2_000)?,
            cache_ttl_secs: positive_or(&lookup, "CACHE_TTL_SECS", 300)?,
            publish_max_attempts: parse_or(&lookup, "PUBLISH_MAX_ATTEMPTS", 3)?,
            breaker_failure_threshold: positive_or(&lookup, "BREAKER_FAILURE_THRESHOLD", 5)?,
            breaker_cooldown_secs: positive_or(&lookup, "BREAKER_COOLDOWN_SECS", 30)?,
            shutdown_grace_secs: parse_or(&lookup, "SHUTDOWN_GRACE_SECS", 10)?,
            request_timeout_secs: positive_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)?,
            default_gateway,
            stripe_health_url: lookup("STRIPE_HEALTH_URL").filter(|v| !v.is_empty()),
            paypal_health_url: lookup("PAYPAL_HEALTH_URL").filter(|v| !v.is_empty()),
        })
    }

    pub fn rate_limit_settings(&self) -> RateLimitSettings {
        RateLimitSettings {
            max_requests: self.rate_limit_requests,
            window: Duration::from_secs(self.rate_limit_window_secs),
        }
    }

    pub fn lock_settings(&self) -> LockSettings {
        LockSettings {
            lease: Duration::from_millis(self.lock_lease_ms),
            acquire_timeout: self.store_timeout(),
        }
    }

    pub fn publisher_settings(&self) -> PublisherSettings {
        PublisherSettings {
            max_attempts: self.publish_max_attempts,
            retry_backoff: Duration::from_millis(200),
            attempt_timeout: Duration::from_secs(5),
            failure_threshold: self.breaker_failure_threshold,
            cooldown: Duration::from_secs(self.breaker_cooldown_secs),
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn default_gateway_kind(&self) -> GatewayKind {
        // Checked in `from_lookup`.
        GatewayKind::from_str(&self.default_gateway).unwrap_or(GatewayKind::Stripe)
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", name, raw)),
        _ => Ok(default),
    }
}

/// Like `parse_or`, but zero is an error.
fn positive_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = parse_or(lookup, name, default)?;
    if value == T::default() {
        anyhow::bail!("{} must be greater than zero", name);
    }
    Ok(value)
}
