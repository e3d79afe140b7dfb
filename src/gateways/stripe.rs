use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{GatewayError, GatewayKind, HealthProbe, PaymentProcessor};
use crate::domain::Transaction;

/// Stub Stripe integration. Produces checkout session data without calling out.
#[derive(Clone, Default)]
pub struct StripeGateway {
    probe: Option<HealthProbe>,
}

impl StripeGateway {
    pub fn new(probe: Option<HealthProbe>) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl PaymentProcessor for StripeGateway {
    fn name(&self) -> &str {
        GatewayKind::Stripe.name()
    }

    async fn check_availability(&self) -> Result<(), GatewayError> {
        match &self.probe {
            Some(probe) => probe.check(self.name()).await,
            None => Ok(()),
        }
    }

    async fn generate_deposit_session(
        &self,
        transaction: &Transaction,
        callback_url: &str,
    ) -> Result<Value, GatewayError> {
        Ok(json!({
            "session_id": format!("cs_{}", Uuid::new_v4().simple()),
            "callback_url": callback_url,
            "amount": transaction.amount.to_string(),
            "currency": transaction.currency,
        }))
    }

    async fn register_withdrawal(
        &self,
        _transaction: &Transaction,
        _callback_url: &str,
        _receiving_account: &str,
    ) -> Result<(), GatewayError> {
        Ok(())
    }
}
