//! Twilio content-template sender for WhatsApp.

use async_trait::async_trait;
use relay_core::config::MessagingConfig;
use relay_core::{GatewayError, MessagingGateway, RenderedMessage};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::outbound::{join_url, rejected, transport_error};

const CHANNEL_PREFIX: &str = "whatsapp:";

#[derive(Clone)]
pub struct TwilioClient {
    client: Client,
    base_url: String,
    account_sid: String,
    auth_token: SecretString,
    sender: String,
}

impl TwilioClient {
    pub fn new(client: Client, config: &MessagingConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            sender: config.sender.clone(),
        }
    }

    fn messages_url(&self) -> String {
        join_url(&self.base_url, &format!("2010-04-01/Accounts/{}/Messages.json", self.account_sid))
    }
}

fn channel_address(address: &str) -> String {
    if address.starts_with(CHANNEL_PREFIX) {
        address.to_string()
    } else {
        format!("{CHANNEL_PREFIX}{address}")
    }
}

fn form_fields(
    message: &RenderedMessage,
    sender: &str,
) -> Result<Vec<(&'static str, String)>, GatewayError> {
    let variables = serde_json::to_string(&message.variables.to_map())
        .map_err(|error| GatewayError::Decode(format!("content variables: {error}")))?;

    Ok(vec![
        ("To", channel_address(&message.to)),
        ("From", channel_address(sender)),
        ("ContentSid", message.content_sid.clone()),
        ("ContentVariables", variables),
    ])
}

#[async_trait]
impl MessagingGateway for TwilioClient {
    async fn send_template(&self, message: &RenderedMessage) -> Result<String, GatewayError> {
        let fields = form_fields(message, &self.sender)?;
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&fields)
            .send()
            .await
            .map_err(transport_error)?;

        // Only `201 Created` means the message was queued.
        if response.status() != StatusCode::CREATED {
            return Err(rejected(response).await);
        }

        let body = response.text().await.map_err(transport_error)?;
        debug!(
            event_name = "messaging.template.accepted",
            template = %message.template,
            "provider accepted template send"
        );
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, routing::post, Router};
    use relay_core::config::MessagingConfig;
    use relay_core::{GatewayError, MessagingGateway, RenderedMessage, VariableSlots};
    use reqwest::Client;
    use tokio::net::TcpListener;

    use super::{channel_address, form_fields, TwilioClient};

    fn message() -> RenderedMessage {
        RenderedMessage {
            template: "rate_alert".to_string(),
            content_sid: "HXRATE".to_string(),
            to: "+447700900123".to_string(),
            variables: VariableSlots::new(vec!["SAR".into(), "GBP".into(), "SAR".into()]),
        }
    }

    // Local stand-in for the provider that answers every send with `status`.
    async fn stub_provider(status: StatusCode, body: &'static str) -> Option<String> {
        let listener = match TcpListener::bind("127.0.0.1:0").await {
            Ok(listener) => listener,
            Err(err) => {
                eprintln!("skipping provider stub test: {err}");
                return None;
            }
        };
        let addr = listener.local_addr().ok()?;
        let app = Router::new().route(
            "/2010-04-01/Accounts/{sid}/Messages.json",
            post(move || async move { (status, body) }),
        );
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                eprintln!("provider stub error: {err}");
            }
        });
        Some(format!("http://{addr}"))
    }

    fn twilio_for(base_url: String) -> TwilioClient {
        let config = MessagingConfig {
            base_url,
            account_sid: "AC0123456789".to_string(),
            auth_token: "twilio-test-token".to_string().into(),
            sender: "+14155238886".to_string(),
        };
        TwilioClient::new(Client::new(), &config)
    }

    #[tokio::test]
    async fn only_created_counts_as_accepted() {
        let Some(created) = stub_provider(StatusCode::CREATED, r#"{"sid":"SM1"}"#).await else {
            return;
        };
        let receipt = twilio_for(created).send_template(&message()).await;
        assert_eq!(receipt, Ok(r#"{"sid":"SM1"}"#.to_string()));

        let Some(ok) = stub_provider(StatusCode::OK, r#"{"sid":"SM2"}"#).await else {
            return;
        };
        let receipt = twilio_for(ok).send_template(&message()).await;
        assert_eq!(
            receipt,
            Err(GatewayError::Rejected { status: 200, body: r#"{"sid":"SM2"}"#.to_string() })
        );
    }

    #[test]
    fn form_fields_prefix_channel_and_encode_variables_as_ordinal_map() {
        let fields = form_fields(&message(), "+14155238886").expect("fields");

        assert_eq!(
            fields,
            vec![
                ("To", "whatsapp:+447700900123".to_string()),
                ("From", "whatsapp:+14155238886".to_string()),
                ("ContentSid", "HXRATE".to_string()),
                ("ContentVariables", r#"{"1":"SAR","2":"GBP","3":"SAR"}"#.to_string()),
            ]
        );
    }

    #[test]
    fn sender_already_carrying_channel_prefix_is_kept() {
        assert_eq!(channel_address("whatsapp:+14155238886"), "whatsapp:+14155238886");
    }
}
