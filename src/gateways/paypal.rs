use async_trait::async_trait;
use serde_json::{json, Value};

use super::{GatewayError, GatewayKind, HealthProbe, PaymentProcessor};
use crate::domain::Transaction;

/// Stub PayPal integration.
#[derive(Clone, Default)]
pub struct PayPalGateway {
    probe: Option<HealthProbe>,
}

impl PayPalGateway {
    pub fn new(probe: Option<HealthProbe>) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl PaymentProcessor for PayPalGateway {
    fn name(&self) -> &str {
        GatewayKind::PayPal.name()
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
            "approval_url": format!("https://www.sandbox.paypal.com/checkoutnow?token=PP-{}", transaction.id),
            "callback_url": callback_url,
        }))
    }

    async fn register_withdrawal(
        &self,
        transaction: &Transaction,
        _callback_url: &str,
        receiving_account: &str,
    ) -> Result<(), GatewayError> {
        if !receiving_account.contains('@') {
            return Err(GatewayError::Rejected {
                gateway: self.name().to_string(),
                reason: format!(
                    "payout for transaction {} needs an email receiving account",
                    transaction.id
                ),
            });
        }
        Ok(())
    }
}
