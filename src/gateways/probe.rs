use reqwest::Client;
use std::time::Duration;

use super::GatewayError;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP liveness check against a processor's status endpoint.
#[derive(Clone)]
pub struct HealthProbe {
    client: Client,
    url: String,
}

impl HealthProbe {
    pub fn new(url: String) -> Self {
        let client = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self { client, url }
    }

    pub async fn check(&self, gateway: &str) -> Result<(), GatewayError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| GatewayError::NotResponding {
                gateway: gateway.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::NotResponding {
                gateway: gateway.to_string(),
                reason: format!("status endpoint returned {}", response.status()),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_accepts_success_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/status")
            .with_status(200)
            .create_async()
            .await;

        let probe = HealthProbe::new(format!("{}/status", server.url()));
        assert!(probe.check("stripe").await.is_ok());
    }

    #[tokio::test]
    async fn test_probe_rejects_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/status")
            .with_status(503)
            .create_async()
            .await;

        let probe = HealthProbe::new(format!("{}/status", server.url()));
        let result = probe.check("paypal").await;
        assert!(matches!(result, Err(GatewayError::NotResponding { .. })));
    }
}
