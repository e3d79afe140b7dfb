use std::collections::HashMap;
use std::sync::Arc;

use super::{
    GatewayError, GatewayKind, HealthProbe, PayPalGateway, PaymentProcessor, StripeGateway,
};

/// Name -> processor lookup with one statically designated global default.
#[derive(Clone)]
pub struct GatewayRegistry {
    processors: HashMap<String, Arc<dyn PaymentProcessor>>,
    default_name: String,
}

impl GatewayRegistry {
    /// Registry containing only `default`; add others with `register`.
    pub fn new(default: Arc<dyn PaymentProcessor>) -> Self {
        let default_name = default.name().to_string();
        let mut processors = HashMap::new();
        processors.insert(default_name.clone(), default);
        Self {
            processors,
            default_name,
        }
    }

    /// The production registry: every `GatewayKind`, each with its optional probe.
    pub fn with_builtin(
        default: GatewayKind,
        stripe_probe: Option<HealthProbe>,
        paypal_probe: Option<HealthProbe>,
    ) -> Self {
        let stripe: Arc<dyn PaymentProcessor> = Arc::new(StripeGateway::new(stripe_probe));
        let paypal: Arc<dyn PaymentProcessor> = Arc::new(PayPalGateway::new(paypal_probe));

        let (default_processor, other) = match default {
            GatewayKind::Stripe => (stripe, paypal),
            GatewayKind::PayPal => (paypal, stripe),
        };

        Self::new(default_processor).register(other)
    }

    pub fn register(mut self, processor: Arc<dyn PaymentProcessor>) -> Self {
        self.processors
            .insert(processor.name().to_string(), processor);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn PaymentProcessor>, GatewayError> {
        self.processors
            .get(&name.trim().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| GatewayError::Unknown(name.to_string()))
    }

    pub fn global_default(&self) -> Arc<dyn PaymentProcessor> {
        // `new` always inserts the default.
        Arc::clone(&self.processors[&self.default_name])
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
