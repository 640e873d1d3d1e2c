//! The dispatcher: turns fired trigger fields into provider calls and CRM side
//! effects.
//!
//! Per fired field the states are
//! `Fired -> Parsed -> Sent -> Cleared+Logged`, or one of the terminal
//! failures `ParseError`, `UnknownTemplate`, `ProviderError` (field left
//! dirty). Quote-forward fields always end `SentToQuoteApi` with the field
//! cleared, whatever the quote service answered.

use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::TemplateCatalog;
use crate::domain::event::ChangeEvent;
use crate::domain::message::{ActivityNote, QuoteRequest, RenderedMessage};
use crate::domain::outcome::{CommentReport, DispatchOutcome, DispatchResult, RelayReport};
use crate::errors::{GatewayError, RelayError};
use crate::gateway::{CrmGateway, MessagingGateway, QuoteGateway};
use crate::phone::normalize_phone;
use crate::render::{QuoteTerms, RenderError, Rendered, VariableSlots};
use crate::trigger::{extract_firings, Firing};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelaySettings {
    /// CRM activity type tag used for the post-send note.
    pub activity_type: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self { activity_type: "whatsapp".to_string() }
    }
}

#[derive(Clone)]
pub struct Relay {
    catalog: Arc<TemplateCatalog>,
    settings: RelaySettings,
    crm: Arc<dyn CrmGateway>,
    messaging: Arc<dyn MessagingGateway>,
    quotes: Option<Arc<dyn QuoteGateway>>,
}

impl Relay {
    pub fn new(
        catalog: Arc<TemplateCatalog>,
        settings: RelaySettings,
        crm: Arc<dyn CrmGateway>,
        messaging: Arc<dyn MessagingGateway>,
    ) -> Self {
        Self { catalog, settings, crm, messaging, quotes: None }
    }

    pub fn with_quote_gateway(mut self, quotes: Arc<dyn QuoteGateway>) -> Self {
        self.quotes = Some(quotes);
        self
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Processes every fired field of one CRM change event, in trigger-table
    /// order. Never fails: request-level problems become a `noop`/`error`
    /// report, field-level problems become that field's result.
    pub async fn handle_change(&self, event: &ChangeEvent, correlation_id: &str) -> RelayReport {
        let extraction = match extract_firings(event, self.catalog.triggers()) {
            Ok(extraction) => extraction,
            Err(error) => {
                info!(
                    event_name = "relay.change.skipped",
                    correlation_id,
                    error = %error,
                    "change event ignored"
                );
                return RelayReport::error(None, &error);
            }
        };

        let entity_id = extraction.entity_id;
        if extraction.firings.is_empty() {
            info!(
                event_name = "relay.change.no_firings",
                correlation_id,
                entity_id = %entity_id,
                "no trigger field transitioned from empty"
            );
            let mut report = RelayReport::noop("no trigger field fired");
            report.entity_id = Some(entity_id);
            return report;
        }

        let phone = match self.resolve_phone(&entity_id).await {
            Ok(phone) => phone,
            Err(error) => {
                warn!(
                    event_name = "relay.change.contact_unresolved",
                    correlation_id,
                    entity_id = %entity_id,
                    error = %error,
                    "could not resolve destination phone"
                );
                return RelayReport::error(Some(entity_id), &error);
            }
        };

        let mut results = Vec::with_capacity(extraction.firings.len());
        for firing in &extraction.firings {
            let result = self.dispatch(&entity_id, &phone, firing).await;
            info!(
                event_name = "relay.field.dispatched",
                correlation_id,
                entity_id = %entity_id,
                field_id = %result.field_id,
                template = %result.template,
                outcome = result.outcome.as_str(),
                field_cleared = result.field_cleared,
                activity_logged = result.activity_logged,
                "trigger field processed"
            );
            results.push(result);
        }

        RelayReport::done(entity_id, results)
    }

    async fn resolve_phone(&self, entity_id: &str) -> Result<String, RelayError> {
        let contact = self
            .crm
            .find_contact(entity_id)
            .await
            .map_err(|error| RelayError::ContactLookup(error.to_string()))?
            .ok_or_else(|| RelayError::PersonNotFound { entity_id: entity_id.to_string() })?;

        contact
            .primary_phone()
            .ok_or_else(|| RelayError::NoPhoneNumber { entity_id: entity_id.to_string() })
    }

    /// Renders and delivers one fired field.
    pub async fn dispatch(&self, entity_id: &str, phone: &str, firing: &Firing) -> DispatchResult {
        if firing.bare_template {
            let error = RenderError::new(
                &firing.template,
                &firing.raw,
                "value names a template but carries no variable text",
            );
            return field_failure(firing, RelayError::Parse(error));
        }

        let Some(descriptor) = self.catalog.template(&firing.template) else {
            return field_failure(firing, RelayError::UnknownTemplate(firing.template.clone()));
        };

        let rendered = match descriptor.rule.render(&firing.template, &firing.raw) {
            Ok(rendered) => rendered,
            Err(error) => return field_failure(firing, RelayError::Parse(error)),
        };

        match rendered {
            Rendered::Quote(terms) => self.forward_quote(entity_id, phone, firing, terms).await,
            Rendered::Variables(variables) => {
                let Some(content_sid) = descriptor.content_sid.clone() else {
                    let error = RelayError::UnknownTemplate(firing.template.clone());
                    return field_failure(firing, error);
                };
                let message = RenderedMessage {
                    template: firing.template.clone(),
                    content_sid,
                    to: phone.to_string(),
                    variables,
                };
                self.send_message(entity_id, firing, message).await
            }
        }
    }

    async fn send_message(
        &self,
        entity_id: &str,
        firing: &Firing,
        message: RenderedMessage,
    ) -> DispatchResult {
        let receipt = match self.messaging.send_template(&message).await {
            Ok(receipt) => receipt,
            Err(error) => return field_failure(firing, RelayError::from(error)),
        };

        let mut result =
            DispatchResult::new(&firing.field_id, &firing.template, DispatchOutcome::Sent)
                .with_detail(receipt);
        result.field_cleared = self.clear_field(entity_id, &firing.field_id).await;

        let note =
            ActivityNote::for_send(entity_id, &message, &firing.raw, &self.settings.activity_type);
        result.activity_logged = match self.crm.log_activity(&note).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "relay.activity.failed",
                    entity_id,
                    field_id = %firing.field_id,
                    error = %error,
                    "message sent but activity note was not recorded"
                );
                false
            }
        };

        result
    }

    // The field is cleared even when the quote service reports failure, so the
    // same value is never forwarded twice.
    async fn forward_quote(
        &self,
        entity_id: &str,
        phone: &str,
        firing: &Firing,
        terms: QuoteTerms,
    ) -> DispatchResult {
        let Some(quotes) = &self.quotes else {
            return field_failure(firing, GatewayError::NotConfigured("quote service").into());
        };

        let request = QuoteRequest::new(phone, terms);
        let mut result = match quotes.forward(&request).await {
            Ok(reply) => {
                if !reply.is_success() {
                    warn!(
                        event_name = "relay.quote.rejected",
                        entity_id,
                        status = reply.status,
                        "quote service did not accept the request"
                    );
                }
                let outcome = DispatchOutcome::SentToQuoteApi;
                DispatchResult::new(&firing.field_id, &firing.template, outcome)
                    .with_detail(reply.body)
            }
            Err(error) => DispatchResult::from_error(
                &firing.field_id,
                &firing.template,
                &RelayError::QuoteForwardAttempted(error.detail()),
            ),
        };

        result.field_cleared = self.clear_field(entity_id, &firing.field_id).await;
        result
    }

    async fn clear_field(&self, entity_id: &str, field_id: &str) -> bool {
        match self.crm.clear_field(entity_id, field_id).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "relay.field.clear_failed",
                    entity_id,
                    field_id,
                    error = %error,
                    "field could not be cleared; it may fire again"
                );
                false
            }
        }
    }

    /// Secondary path: a comment whose first token names the template and
    /// whose remainder fills `{1}`.
    pub async fn relay_comment(
        &self,
        body: &str,
        recipient: &str,
        correlation_id: &str,
    ) -> CommentReport {
        let body = body.trim();
        if body.is_empty() || recipient.trim().is_empty() {
            return CommentReport::noop();
        }

        // A bare template name without text is not a relay request.
        let Some((template, variable_text)) = body.split_once(char::is_whitespace) else {
            return CommentReport::noop();
        };
        let variable_text = variable_text.trim();

        let Some(content_sid) =
            self.catalog.template(template).and_then(|descriptor| descriptor.content_sid.clone())
        else {
            info!(
                event_name = "relay.comment.unknown_template",
                correlation_id,
                template,
                "comment does not name a message template"
            );
            return CommentReport::noop();
        };

        let Some(to) = normalize_phone(recipient) else {
            return CommentReport::noop();
        };

        let message = RenderedMessage {
            template: template.to_string(),
            content_sid,
            to,
            variables: VariableSlots::new(vec![variable_text.to_string()]),
        };

        match self.messaging.send_template(&message).await {
            Ok(_) => {
                info!(
                    event_name = "relay.comment.sent",
                    correlation_id,
                    template,
                    "comment relayed"
                );
                CommentReport::success()
            }
            Err(error) => {
                warn!(
                    event_name = "relay.comment.failed",
                    correlation_id,
                    template,
                    error = %error,
                    "comment relay rejected by provider"
                );
                CommentReport::error(error.detail())
            }
        }
    }
}

fn field_failure(firing: &Firing, error: RelayError) -> DispatchResult {
    warn!(
        event_name = "relay.field.failed",
        field_id = %firing.field_id,
        template = %firing.template,
        error = %error,
        "trigger field left untouched"
    );
    DispatchResult::from_error(&firing.field_id, &firing.template, &error)
}
