use async_trait::async_trait;
use relay_core::config::QuoteConfig;
use relay_core::{GatewayError, QuoteGateway, QuoteReply, QuoteRequest};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use crate::outbound::transport_error;

/// Forwards parsed quote requests to the external quote service.
#[derive(Clone)]
pub struct QuoteClient {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    api_key_header: String,
}

impl QuoteClient {
    /// `None` unless both endpoint and key are configured.
    pub fn from_config(client: Client, config: &QuoteConfig) -> Option<Self> {
        let endpoint = config.endpoint.clone()?;
        let api_key = config.api_key.clone()?;
        Some(Self { client, endpoint, api_key, api_key_header: config.api_key_header.clone() })
    }
}

#[async_trait]
impl QuoteGateway for QuoteClient {
    async fn forward(&self, request: &QuoteRequest) -> Result<QuoteReply, GatewayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(self.api_key_header.as_str(), self.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        Ok(QuoteReply { status, body })
    }
}
