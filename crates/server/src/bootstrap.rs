use std::sync::Arc;

use relay_core::config::{AppConfig, ConfigError};
use relay_core::{Relay, RelaySettings};
use reqwest::Client;
use thiserror::Error;
use tracing::{info, warn};

use crate::crm::PipedriveClient;
use crate::messaging::TwilioClient;
use crate::quote::QuoteClient;

pub struct Application {
    pub config: AppConfig,
    pub relay: Relay,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Assembles the relay from an already loaded config. The config is validated
/// again since callers may have built it by hand.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.validate()?;

    let client = Client::builder()
        .user_agent(concat!("relay-server/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(BootstrapError::HttpClient)?;

    for template in config.catalog.unresolved_templates() {
        warn!(
            event_name = "system.bootstrap.unresolved_template",
            correlation_id = "bootstrap",
            template,
            "trigger names a template with no descriptor; it will report unknown_template"
        );
    }

    let settings = RelaySettings { activity_type: config.crm.activity_type.clone() };
    let mut relay = Relay::new(
        Arc::new(config.catalog.clone()),
        settings,
        Arc::new(PipedriveClient::new(client.clone(), &config.crm)),
        Arc::new(TwilioClient::new(client.clone(), &config.messaging)),
    );
    if let Some(quotes) = QuoteClient::from_config(client, &config.quote) {
        relay = relay.with_quote_gateway(Arc::new(quotes));
    }

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        triggers = config.catalog.triggers().len(),
        templates = config.catalog.templates().count(),
        quote_forwarding = config.quote.endpoint.is_some(),
        "relay assembled"
    );

    Ok(Application { config, relay })
}
