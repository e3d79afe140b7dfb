//! Adapters implementing the ports in `crate::ports`.

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod log_broker;
pub mod memory;
pub mod postgres_repository;
pub mod redis_store;

#[cfg(feature = "kafka")]
pub use kafka::KafkaBroker;
pub use log_broker::LogBroker;
pub use postgres_repository::PostgresRepository;
pub use redis_store::RedisStore;
