use rust_decimal::Decimal;
use serde::Serialize;

use crate::phone::normalize_phone;
use crate::render::{QuoteTerms, VariableSlots};

/// CRM person as far as the relay cares about it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Contact {
    pub entity_id: String,
    pub phones: Vec<String>,
}

impl Contact {
    /// First listed phone in canonical form.
    pub fn primary_phone(&self) -> Option<String> {
        self.phones.first().and_then(|phone| normalize_phone(phone))
    }
}

/// A template send, ready for the messaging provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RenderedMessage {
    pub template: String,
    pub content_sid: String,
    pub to: String,
    pub variables: VariableSlots,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuoteRequest {
    pub phone: String,
    pub pair: String,
    pub direction: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

impl QuoteRequest {
    pub fn new(phone: impl Into<String>, terms: QuoteTerms) -> Self {
        Self {
            phone: phone.into(),
            pair: terms.pair,
            direction: terms.direction,
            amount: terms.amount,
        }
    }
}

/// Activity appended to the CRM person after a successful send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityNote {
    pub entity_id: String,
    pub subject: String,
    pub note: String,
    pub activity_type: String,
    pub done: bool,
}

impl ActivityNote {
    pub fn for_send(
        entity_id: &str,
        message: &RenderedMessage,
        raw_value: &str,
        activity_type: &str,
    ) -> Self {
        let variables = if message.variables.is_empty() {
            "none".to_string()
        } else {
            message
                .variables
                .iter()
                .map(|(ordinal, value)| format!("{{{ordinal}}} = {value}"))
                .collect::<Vec<_>>()
                .join(", ")
        };

        Self {
            entity_id: entity_id.to_string(),
            subject: format!("WhatsApp template `{}` sent", message.template),
            note: format!(
                "Template: {}\nSent to: {}\nVariables: {variables}\nField value: {raw_value}",
                message.template, message.to
            ),
            activity_type: activity_type.to_string(),
            done: true,
        }
    }
}
