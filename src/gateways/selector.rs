use std::sync::Arc;

use super::{GatewayError, GatewayRegistry, PaymentProcessor};
use crate::ports::TransactionRepository;

/// Picks a live processor for a country by walking its priority list.
#[derive(Clone)]
pub struct GatewaySelector {
    repository: Arc<dyn TransactionRepository>,
    registry: GatewayRegistry,
}

impl GatewaySelector {
    pub fn new(repository: Arc<dyn TransactionRepository>, registry: GatewayRegistry) -> Self {
        Self {
            repository,
            registry,
        }
    }

    pub fn registry(&self) -> &GatewayRegistry {
        &self.registry
    }

    /// With no priorities configured the global default is used, provided it
    /// answers its probe. Otherwise candidates are scanned once in rank order;
    /// unknown or unresponsive ones are skipped. No retries here.
    pub async fn select(&self, country_id: i64) -> Result<Arc<dyn PaymentProcessor>, GatewayError> {
        let priorities = self.repository.get_gateway_priorities(country_id).await?;

        if priorities.is_empty() {
            let gateway = self.registry.global_default();
            gateway.check_availability().await?;
            tracing::debug!(country_id, gateway = gateway.name(), "using global default gateway");
            return Ok(gateway);
        }

        for candidate in priorities.iter().filter(|p| p.is_active) {
            let gateway = match self.registry.resolve(&candidate.gateway_name) {
                Ok(gateway) => gateway,
                Err(e) => {
                    tracing::warn!(payment_gateway = %candidate.gateway_name, "{}", e);
                    continue;
                }
            };

            if let Err(e) = gateway.check_availability().await {
                tracing::warn!(payment_gateway = %candidate.gateway_name, "{}", e);
                continue;
            }

            return Ok(gateway);
        }

        Err(GatewayError::NoneAvailable)
    }

    /// Resolve a caller-named processor and make sure it is up.
    pub async fn resolve_live(&self, name: &str) -> Result<Arc<dyn PaymentProcessor>, GatewayError> {
        let gateway = self.registry.resolve(name)?;
        gateway.check_availability().await?;
        Ok(gateway)
    }
}
