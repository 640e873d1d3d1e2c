//! Collaborator seams. The server crate provides HTTP implementations; tests
//! provide in-memory ones.

use async_trait::async_trait;

use crate::domain::message::{ActivityNote, Contact, QuoteRequest, RenderedMessage};
use crate::errors::GatewayError;

#[async_trait]
pub trait CrmGateway: Send + Sync {
    /// `Ok(None)` when the person does not exist.
    async fn find_contact(&self, entity_id: &str) -> Result<Option<Contact>, GatewayError>;

    async fn clear_field(&self, entity_id: &str, field_id: &str) -> Result<(), GatewayError>;

    async fn log_activity(&self, activity: &ActivityNote) -> Result<(), GatewayError>;
}

#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Returns the provider's raw response body on acceptance.
    async fn send_template(&self, message: &RenderedMessage) -> Result<String, GatewayError>;
}

#[async_trait]
pub trait QuoteGateway: Send + Sync {
    /// Returns the quote service's raw response body. Any HTTP status counts
    /// as a completed call; only transport failures are errors.
    async fn forward(&self, request: &QuoteRequest) -> Result<QuoteReply, GatewayError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuoteReply {
    pub status: u16,
    pub body: String,
}

impl QuoteReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
