//! Kafka implementation of EventBroker.

use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use std::time::Duration;

use crate::ports::{BrokerError, EventBroker};

#[derive(Clone)]
pub struct KafkaBroker {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaBroker {
    pub fn new(bootstrap: &str, send_timeout: Duration) -> Result<Self, BrokerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap)
            .set("message.timeout.ms", send_timeout.as_millis().to_string())
            .create()
            .map_err(|e| BrokerError::Write(e.to_string()))?;
        Ok(Self {
            producer,
            send_timeout,
        })
    }
}

#[async_trait]
impl EventBroker for KafkaBroker {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);
        if let Err((e, _)) = self.producer.send(record, self.send_timeout).await {
            return Err(BrokerError::Write(e.to_string()));
        }
        Ok(())
    }

    async fn flush(&self, timeout: Duration) -> Result<(), BrokerError> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| BrokerError::Write(e.to_string()))?
            .map_err(|_| BrokerError::Timeout)
    }
}
