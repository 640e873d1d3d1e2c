use serde::Serialize;

use crate::errors::RelayError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent,
    SentToQuoteApi,
    ParseError,
    UnknownTemplate,
    ProviderError,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::SentToQuoteApi => "sent_to_quote_api",
            Self::ParseError => "parse_error",
            Self::UnknownTemplate => "unknown_template",
            Self::ProviderError => "provider_error",
        }
    }
}

/// Terminal state of one fired field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    pub field_id: String,
    pub template: String,
    pub outcome: DispatchOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub field_cleared: bool,
    pub activity_logged: bool,
}

impl DispatchResult {
    pub fn new(field_id: &str, template: &str, outcome: DispatchOutcome) -> Self {
        Self {
            field_id: field_id.to_string(),
            template: template.to_string(),
            outcome,
            detail: None,
            field_cleared: false,
            activity_logged: false,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Maps a field-scoped error to its terminal result. The field stays dirty.
    pub fn from_error(field_id: &str, template: &str, error: &RelayError) -> Self {
        let outcome = match error {
            RelayError::Parse(_) => DispatchOutcome::ParseError,
            RelayError::UnknownTemplate(_) => DispatchOutcome::UnknownTemplate,
            RelayError::QuoteForwardAttempted(_) => DispatchOutcome::SentToQuoteApi,
            _ => DispatchOutcome::ProviderError,
        };
        Self::new(field_id, template, outcome).with_detail(error.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Noop,
    Done,
    Error,
}

/// Response body of the CRM webhook. Always delivered with HTTP 200.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RelayReport {
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<DispatchResult>,
}

impl RelayReport {
    pub fn noop(reason: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::Noop,
            error: Some(reason.into()),
            entity_id: None,
            results: Vec::new(),
        }
    }

    pub fn error(entity_id: Option<String>, error: &RelayError) -> Self {
        let status = if matches!(error, RelayError::MissingEntityId) {
            ReportStatus::Noop
        } else {
            ReportStatus::Error
        };
        Self { status, error: Some(error.to_string()), entity_id, results: Vec::new() }
    }

    pub fn done(entity_id: String, results: Vec<DispatchResult>) -> Self {
        Self { status: ReportStatus::Done, error: None, entity_id: Some(entity_id), results }
    }

    pub fn count(&self, outcome: DispatchOutcome) -> usize {
        self.results.iter().filter(|result| result.outcome == outcome).count()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentStatus {
    Noop,
    Success,
    Error,
}

/// Response body of the secondary (comment) webhook.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommentReport {
    pub status: CommentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CommentReport {
    pub fn noop() -> Self {
        Self { status: CommentStatus::Noop, details: None }
    }

    pub fn success() -> Self {
        Self { status: CommentStatus::Success, details: None }
    }

    pub fn error(details: impl Into<String>) -> Self {
        Self { status: CommentStatus::Error, details: Some(details.into()) }
    }
}
