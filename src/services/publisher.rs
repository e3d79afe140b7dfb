//! At-least-once event publishing with retry behind a circuit breaker.

use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

use super::masking::{DataMasker, MaskingError};
use crate::ports::{BrokerError, EventBroker};
use crate::schemas::DataFormat;

pub const JSON_TOPIC: &str = "transactions.json";
pub const SOAP_TOPIC: &str = "transactions.soap";

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("payload could not be masked: {0}")]
    Masking(#[from] MaskingError),

    #[error("event broker circuit breaker is open")]
    CircuitOpen,

    #[error("publish failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: BrokerError },
}

#[derive(Debug, Clone, Copy)]
pub struct PublisherSettings {
    pub max_attempts: u32,
    /// Delay before the second attempt; grows linearly after that.
    pub retry_backoff: Duration,
    pub attempt_timeout: Duration,
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

pub fn topic_for(format: DataFormat) -> &'static str {
    match format {
        DataFormat::Json => JSON_TOPIC,
        DataFormat::Xml => SOAP_TOPIC,
    }
}

#[derive(Clone)]
pub struct Publisher {
    broker: Arc<dyn EventBroker>,
    masker: DataMasker,
    circuit_breaker: Breaker,
    settings: PublisherSettings,
}

impl Publisher {
    pub fn new(broker: Arc<dyn EventBroker>, masker: DataMasker, settings: PublisherSettings) -> Self {
        let backoff = backoff::equal_jittered(settings.cooldown, settings.cooldown * 2);
        let policy = failure_policy::consecutive_failures(settings.failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Self {
            broker,
            masker,
            circuit_breaker,
            settings,
        }
    }

    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }

    /// Mask `payload` and write it to the topic for `format`, keyed by the
    /// transaction id so one transaction's events stay ordered.
    pub async fn publish<T: Serialize>(
        &self,
        transaction_id: i64,
        payload: &T,
        format: DataFormat,
    ) -> Result<(), PublishError> {
        let masked = self.masker.mask(payload)?;
        let topic = topic_for(format);
        let key = transaction_id.to_string();
        let attempts = self.settings.max_attempts.max(1);

        let mut last = BrokerError::Timeout;
        for attempt in 1..=attempts {
            let send = async {
                match timeout(
                    self.settings.attempt_timeout,
                    self.broker.send(topic, &key, &masked),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(BrokerError::Timeout),
                }
            };

            match self.circuit_breaker.call(send).await {
                Ok(()) => {
                    tracing::debug!(transaction_id, topic, attempt, "event published");
                    return Ok(());
                }
                Err(FailsafeError::Rejected) => return Err(PublishError::CircuitOpen),
                Err(FailsafeError::Inner(e)) => {
                    tracing::warn!(transaction_id, topic, attempt, error = %e, "publish attempt failed");
                    last = e;
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.settings.retry_backoff * attempt).await;
            }
        }

        Err(PublishError::Exhausted { attempts, last })
    }

    /// Publishing is a side channel: failures are logged, never returned.
    pub async fn publish_or_warn<T: Serialize>(
        &self,
        transaction_id: i64,
        payload: &T,
        format: DataFormat,
    ) {
        if let Err(e) = self.publish(transaction_id, payload, format).await {
            tracing::warn!(transaction_id, error = %e, "event not published");
        }
    }

    pub async fn flush(&self, wait: Duration) -> Result<(), BrokerError> {
        self.broker.flush(wait).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::RecordingBroker;
    use serde_json::{json, Value};

    fn settings(failure_threshold: u32) -> PublisherSettings {
        PublisherSettings {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(100),
            attempt_timeout: Duration::from_secs(1),
            failure_threshold,
            cooldown: Duration::from_secs(30),
        }
    }

    fn masker() -> DataMasker {
        DataMasker::from_bytes(&[3u8; 32]).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_is_keyed_and_masked() {
        let broker = RecordingBroker::new();
        let publisher = Publisher::new(Arc::new(broker.clone()), masker(), settings(5));
        let payload = json!({"session_id": "cs_1"});

        publisher.publish(7, &payload, DataFormat::Xml).await.unwrap();

        let messages = broker.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, SOAP_TOPIC);
        assert_eq!(messages[0].key, "7");
        let recovered: Value = masker().unmask(&messages[0].payload).unwrap();
        assert_eq!(recovered, payload);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let broker = RecordingBroker::new();
        broker.fail_next(2);
        let publisher = Publisher::new(Arc::new(broker.clone()), masker(), settings(5));

        publisher
            .publish(1, &json!({"a": 1}), DataFormat::Json)
            .await
            .unwrap();

        assert_eq!(broker.attempts(), 3);
        assert_eq!(broker.messages()[0].topic, JSON_TOPIC);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_report_last_error() {
        let broker = RecordingBroker::new();
        broker.set_always_fail(true);
        let publisher = Publisher::new(Arc::new(broker.clone()), masker(), settings(10));

        let result = publisher.publish(1, &json!({}), DataFormat::Json).await;
        assert!(matches!(
            result,
            Err(PublishError::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(broker.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_skips_the_broker() {
        let broker = RecordingBroker::new();
        broker.set_always_fail(true);
        let publisher = Publisher::new(Arc::new(broker.clone()), masker(), settings(2));

        let mut opened = false;
        for _ in 0..5 {
            if let Err(PublishError::CircuitOpen) =
                publisher.publish(1, &json!({}), DataFormat::Json).await
            {
                opened = true;
                break;
            }
        }
        assert!(opened);
        assert_eq!(publisher.circuit_state(), "open");

        let attempts = broker.attempts();
        let result = publisher.publish(2, &json!({}), DataFormat::Json).await;
        assert!(matches!(result, Err(PublishError::CircuitOpen)));
        assert_eq!(broker.attempts(), attempts);
    }

    // failsafe tracks the cooldown on the wall clock, so this one runs unpaused.
    #[tokio::test]
    async fn test_breaker_closes_after_cooldown_once_broker_recovers() {
        let broker = RecordingBroker::new();
        broker.set_always_fail(true);
        let publisher = Publisher::new(
            Arc::new(broker.clone()),
            masker(),
            PublisherSettings {
                max_attempts: 1,
                retry_backoff: Duration::from_millis(10),
                attempt_timeout: Duration::from_secs(1),
                failure_threshold: 2,
                cooldown: Duration::from_secs(1),
            },
        );

        for _ in 0..5 {
            if publisher.circuit_state() == "open" {
                break;
            }
            let _ = publisher.publish(1, &json!({}), DataFormat::Json).await;
        }
        assert_eq!(publisher.circuit_state(), "open");

        broker.set_always_fail(false);
        tokio::time::sleep(Duration::from_millis(2100)).await;

        publisher
            .publish(1, &json!({"status": "success"}), DataFormat::Json)
            .await
            .unwrap();
        assert_eq!(publisher.circuit_state(), "closed");
        assert_eq!(broker.messages().len(), 1);
    }
}
