use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use payrail_core::adapters::{PostgresRepository, RedisStore};
use payrail_core::cli::{self, Cli, Commands, DbCommands};
use payrail_core::config::Config;
use payrail_core::gateways::{GatewayRegistry, GatewaySelector, HealthProbe};
use payrail_core::health::{BreakerChecker, HealthService, PostgresChecker, RedisChecker};
use payrail_core::ports::{EventBroker, KeyValueStore, TransactionRepository};
use payrail_core::services::{Cache, DataMasker, LockManager, PaymentService, Publisher, RateLimiter};
use payrail_core::{create_app, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(Commands::Db(DbCommands::Migrate)) => cli::handle_db_migrate(&config).await,
        Some(Commands::Config) => cli::handle_config_validate(&config),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config)
        .await
        .context("failed to connect to Postgres")?;
    db::run_migrations(&pool).await?;

    let redis = RedisStore::new(&config.redis_url, config.store_timeout())
        .context("invalid REDIS_URL")?;
    let broker = build_broker(&config)?;
    let masker = DataMasker::from_base64(&config.masking_key).context("invalid MASKING_KEY")?;

    let repository: Arc<dyn TransactionRepository> = Arc::new(PostgresRepository::new(pool.clone()));
    let store: Arc<dyn KeyValueStore> = Arc::new(redis.clone());

    let registry = GatewayRegistry::with_builtin(
        config.default_gateway_kind(),
        config.stripe_health_url.clone().map(HealthProbe::new),
        config.paypal_health_url.clone().map(HealthProbe::new),
    );
    tracing::info!(
        gateways = ?registry.names(),
        default = %config.default_gateway,
        "gateway registry initialized"
    );

    let publisher = Publisher::new(Arc::clone(&broker), masker, config.publisher_settings());
    let payments = PaymentService::new(
        Arc::clone(&repository),
        GatewaySelector::new(Arc::clone(&repository), registry),
        LockManager::new(Arc::clone(&store), config.lock_settings()),
        Cache::new(Arc::clone(&store), config.cache_ttl()),
        publisher.clone(),
        config.api_base_url.clone(),
    );

    let health = HealthService::builder()
        .with("postgres", true, Arc::new(PostgresChecker::new(pool.clone())))
        .with("redis", false, Arc::new(RedisChecker::new(redis)))
        .with("publisher", false, Arc::new(BreakerChecker::new(publisher.clone())))
        .build();

    let state = AppState {
        payments,
        rate_limiter: RateLimiter::new(store, config.rate_limit_settings()),
        health,
    };
    let app = create_app(state, config.request_timeout());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let server = axum::Server::try_bind(&addr)?
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stop_tx.send(true);
        });

    let grace = config.shutdown_grace();
    tokio::select! {
        result = server => result?,
        _ = async {
            if stop_rx.changed().await.is_ok() {
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {
            tracing::warn!(grace_secs = grace.as_secs(), "in-flight requests did not drain in time");
        }
    }

    if let Err(e) = publisher.flush(grace).await {
        tracing::warn!(error = %e, "broker flush incomplete at shutdown");
    }
    pool.close().await;
    tracing::info!("shutdown complete");

    Ok(())
}

#[cfg(feature = "kafka")]
fn build_broker(config: &Config) -> anyhow::Result<Arc<dyn EventBroker>> {
    let broker = payrail_core::adapters::KafkaBroker::new(
        &config.kafka_broker_url,
        config.publisher_settings().attempt_timeout,
    )
    .context("failed to create Kafka producer")?;
    tracing::info!(brokers = %config.kafka_broker_url, "Kafka producer initialized");
    Ok(Arc::new(broker))
}

#[cfg(not(feature = "kafka"))]
fn build_broker(_config: &Config) -> anyhow::Result<Arc<dyn EventBroker>> {
    tracing::warn!("built without the kafka feature; events go to the log");
    Ok(Arc::new(payrail_core::adapters::LogBroker))
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT, starting graceful shutdown"),
        () = terminate => tracing::info!("received SIGTERM, starting graceful shutdown"),
    }
}
