use async_trait::async_trait;
use std::time::Duration;

use crate::ports::{BrokerError, EventBroker};

/// Broker used when no Kafka producer is compiled in: events go to the log.
#[derive(Clone, Default)]
pub struct LogBroker;

#[async_trait]
impl EventBroker for LogBroker {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        tracing::info!(topic, key, bytes = payload.len(), "event published to log broker");
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), BrokerError> {
        Ok(())
    }
}
