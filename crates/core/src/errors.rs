use thiserror::Error;

use crate::render::RenderError;

/// Failures a single relay request can run into.
///
/// Request-level variants (`MissingEntityId`, `PersonNotFound`,
/// `NoPhoneNumber`, `ContactLookup`) abort the whole event. The remaining
/// variants are scoped to one fired field and never affect its siblings.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("change event carries no entity id")]
    MissingEntityId,
    #[error("person `{entity_id}` was not found in the CRM")]
    PersonNotFound { entity_id: String },
    #[error("person `{entity_id}` has no usable phone number")]
    NoPhoneNumber { entity_id: String },
    #[error("contact lookup failed: {0}")]
    ContactLookup(String),
    #[error(transparent)]
    Parse(#[from] RenderError),
    #[error("unknown template `{0}`")]
    UnknownTemplate(String),
    #[error("provider rejected send: {0}")]
    Provider(String),
    #[error("quote forward attempted: {0}")]
    QuoteForwardAttempted(String),
}

/// Error surfaced by an outbound collaborator call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("upstream returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("could not decode upstream response: {0}")]
    Decode(String),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl GatewayError {
    /// Raw upstream detail, suitable for echoing back to the webhook caller.
    pub fn detail(&self) -> String {
        match self {
            Self::Rejected { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

impl From<GatewayError> for RelayError {
    fn from(value: GatewayError) -> Self {
        Self::Provider(value.detail())
    }
}
