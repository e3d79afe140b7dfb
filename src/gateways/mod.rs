//! Payment processors and how one is picked for a request.
//!
//! Processors form a closed set (`GatewayKind`); each is a `PaymentProcessor`
//! held in a `GatewayRegistry` and looked up by the name stored in the
//! `gateway_priority` table.

pub mod paypal;
pub mod probe;
pub mod registry;
pub mod selector;
pub mod stripe;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::Transaction;
use crate::ports::RepositoryError;

pub use paypal::PayPalGateway;
pub use probe::HealthProbe;
pub use registry::GatewayRegistry;
pub use selector::GatewaySelector;
pub use stripe::StripeGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unknown payment gateway: {0}")]
    Unknown(String),

    #[error("payment gateway {gateway} not responding: {reason}")]
    NotResponding { gateway: String, reason: String },

    #[error("payment gateway {gateway} rejected the request: {reason}")]
    Rejected { gateway: String, reason: String },

    #[error("no payment gateway available")]
    NoneAvailable,

    #[error("error getting gateway priorities: {0}")]
    Priorities(#[from] RepositoryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayKind {
    Stripe,
    PayPal,
}

impl GatewayKind {
    pub const ALL: [GatewayKind; 2] = [GatewayKind::Stripe, GatewayKind::PayPal];

    pub fn name(&self) -> &'static str {
        match self {
            GatewayKind::Stripe => "stripe",
            GatewayKind::PayPal => "paypal",
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GatewayKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stripe" => Ok(GatewayKind::Stripe),
            "paypal" => Ok(GatewayKind::PayPal),
            _ => Err(GatewayError::Unknown(s.to_string())),
        }
    }
}

/// Capabilities every payment processor exposes.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Unique name matching the gateway row in the database.
    fn name(&self) -> &str;

    /// Liveness probe.
    async fn check_availability(&self) -> Result<(), GatewayError>;

    /// Checkout data the client needs to complete a deposit.
    async fn generate_deposit_session(
        &self,
        transaction: &Transaction,
        callback_url: &str,
    ) -> Result<Value, GatewayError>;

    async fn register_withdrawal(
        &self,
        transaction: &Transaction,
        callback_url: &str,
        receiving_account: &str,
    ) -> Result<(), GatewayError>;
}
