pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod gateway;
pub mod phone;
pub mod relay;
pub mod render;
pub mod trigger;

pub use catalog::{CatalogError, TemplateCatalog, TemplateDescriptor, TriggerField, TriggerTemplate};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::event::ChangeEvent;
pub use domain::message::{ActivityNote, Contact, QuoteRequest, RenderedMessage};
pub use domain::outcome::{
    CommentReport, CommentStatus, DispatchOutcome, DispatchResult, RelayReport, ReportStatus,
};
pub use errors::{GatewayError, RelayError};
pub use gateway::{CrmGateway, MessagingGateway, QuoteGateway, QuoteReply};
pub use phone::normalize_phone;
pub use relay::{Relay, RelaySettings};
pub use render::{QuoteTerms, RenderError, RenderRule, Rendered, VariableSlots};
pub use trigger::{extract_firings, Extraction, Firing};
