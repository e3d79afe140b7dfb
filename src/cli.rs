use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "payrail-core")]
#[command(about = "Payrail Core - payment orchestration service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;
    pool.close().await;

    println!("✓ Database migrations completed");
    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    for line in describe_config(config) {
        println!("{}", line);
    }
    println!("✓ Configuration is valid");
    Ok(())
}

/// Human readable configuration with credentials hidden.
pub fn describe_config(config: &Config) -> Vec<String> {
    vec![
        "Configuration:".to_string(),
        format!("  Server Port: {}", config.server_port),
        format!("  Database URL: {}", mask_password(&config.database_url)),
        format!("  Redis URL: {}", mask_password(&config.redis_url)),
        format!("  Event Broker: {}", broker_mode(&config.kafka_broker_url)),
        format!("  API Base URL: {}", config.api_base_url),
        "  Masking Key: ****".to_string(),
        format!(
            "  Rate Limit: {} requests / {}s",
            config.rate_limit_requests, config.rate_limit_window_secs
        ),
        format!("  Lock Lease: {}ms", config.lock_lease_ms),
        format!("  Store Timeout: {}ms", config.store_timeout_ms),
        format!("  Cache TTL: {}s", config.cache_ttl_secs),
        format!(
            "  Publisher: {} attempts, breaker opens after {} failures for {}s",
            config.publish_max_attempts,
            config.breaker_failure_threshold,
            config.breaker_cooldown_secs
        ),
        format!("  Default Gateway: {}", config.default_gateway),
        format!(
            "  Stripe Health URL: {}",
            config.stripe_health_url.as_deref().unwrap_or("-")
        ),
        format!(
            "  PayPal Health URL: {}",
            config.paypal_health_url.as_deref().unwrap_or("-")
        ),
    ]
}

/// Without the `kafka` feature the broker URL is unused.
fn broker_mode(kafka_broker_url: &str) -> String {
    if cfg!(feature = "kafka") {
        format!("kafka ({})", kafka_broker_url)
    } else {
        format!(
            "log only, built without the kafka feature (KAFKA_BROKER_URL={} ignored)",
            kafka_broker_url
        )
    }
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
