//! Trigger field and template tables.
//!
//! The catalog is static for the lifetime of the process: it is assembled once
//! by the config loader and handed to the relay behind an `Arc`.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use thiserror::Error;

use crate::render::RenderRule;

/// How a trigger field picks its template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum TriggerTemplate {
    Fixed(String),
    /// First token of the field value names the template; the remainder is
    /// the raw value handed to the renderer.
    FromValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TriggerField {
    pub field_id: String,
    pub template: TriggerTemplate,
}

impl TriggerField {
    pub fn fixed(field_id: impl Into<String>, template: impl Into<String>) -> Self {
        Self { field_id: field_id.into(), template: TriggerTemplate::Fixed(template.into()) }
    }

    pub fn from_value(field_id: impl Into<String>) -> Self {
        Self { field_id: field_id.into(), template: TriggerTemplate::FromValue }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TemplateDescriptor {
    pub name: String,
    /// Provider content identifier. Absent only for quote-forward templates.
    pub content_sid: Option<String>,
    pub rule: RenderRule,
}

impl TemplateDescriptor {
    pub fn message(
        name: impl Into<String>,
        content_sid: impl Into<String>,
        rule: RenderRule,
    ) -> Self {
        Self { name: name.into(), content_sid: Some(content_sid.into()), rule }
    }

    pub fn quote_forward(name: impl Into<String>) -> Self {
        Self { name: name.into(), content_sid: None, rule: RenderRule::QuoteForward }
    }

    pub fn is_quote_forward(&self) -> bool {
        self.rule == RenderRule::QuoteForward
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("trigger field id must not be empty")]
    EmptyFieldId,
    #[error("trigger field `{0}` is configured more than once")]
    DuplicateField(String),
    #[error("trigger field `{0}` names an empty template")]
    EmptyTemplateName(String),
    #[error("template `{0}` needs a content_sid")]
    MissingContentSid(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemplateCatalog {
    triggers: Vec<TriggerField>,
    templates: BTreeMap<String, TemplateDescriptor>,
}

#[derive(Debug, Clone, Copy)]
struct BuiltinTrigger {
    field_id: &'static str,
    template: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
struct BuiltinTemplate {
    name: &'static str,
    content_sid: &'static str,
    rule: RenderRule,
}

const BUILTIN_TRIGGERS: &[BuiltinTrigger] =
    &[BuiltinTrigger { field_id: "cd83bf5536c29ee8f207e865c81fbad299472bfc", template: None }];

const BUILTIN_TEMPLATES: &[BuiltinTemplate] = &[
    BuiltinTemplate {
        name: "payment_released",
        content_sid: "HX6b4482f404e6b063984df49dc3b3e69c",
        rule: RenderRule::Whole,
    },
    BuiltinTemplate {
        name: "settlement_received",
        content_sid: "HX706c585bc08250b45418ae5c6da063a9",
        rule: RenderRule::Whole,
    },
];

impl TemplateCatalog {
    pub fn new(
        triggers: Vec<TriggerField>,
        templates: impl IntoIterator<Item = TemplateDescriptor>,
    ) -> Self {
        let templates =
            templates.into_iter().map(|template| (template.name.clone(), template)).collect();
        Self { triggers, templates }
    }

    /// Catalog used when no config file provides one.
    pub fn builtin() -> Self {
        let triggers = BUILTIN_TRIGGERS
            .iter()
            .map(|trigger| match trigger.template {
                Some(template) => TriggerField::fixed(trigger.field_id, template),
                None => TriggerField::from_value(trigger.field_id),
            })
            .collect();
        let templates = BUILTIN_TEMPLATES.iter().map(|template| {
            TemplateDescriptor::message(template.name, template.content_sid, template.rule)
        });
        Self::new(triggers, templates)
    }

    pub fn triggers(&self) -> &[TriggerField] {
        &self.triggers
    }

    pub fn template(&self, name: &str) -> Option<&TemplateDescriptor> {
        self.templates.get(name)
    }

    pub fn templates(&self) -> impl Iterator<Item = &TemplateDescriptor> {
        self.templates.values()
    }

    pub fn replace_triggers(&mut self, triggers: Vec<TriggerField>) {
        self.triggers = triggers;
    }

    pub fn upsert_template(&mut self, template: TemplateDescriptor) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn uses_quote_forward(&self) -> bool {
        self.templates.values().any(TemplateDescriptor::is_quote_forward)
    }

    /// Fixed trigger templates with no descriptor. These fire at runtime as
    /// `unknown_template`, so they are reported rather than rejected.
    pub fn unresolved_templates(&self) -> Vec<&str> {
        self.triggers
            .iter()
            .filter_map(|trigger| match &trigger.template {
                TriggerTemplate::Fixed(name) if !self.templates.contains_key(name) => {
                    Some(name.as_str())
                }
                _ => None,
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for trigger in &self.triggers {
            let field_id = trigger.field_id.trim();
            if field_id.is_empty() {
                return Err(CatalogError::EmptyFieldId);
            }
            if !seen.insert(field_id) {
                return Err(CatalogError::DuplicateField(field_id.to_owned()));
            }
            if let TriggerTemplate::Fixed(name) = &trigger.template {
                if name.trim().is_empty() {
                    return Err(CatalogError::EmptyTemplateName(field_id.to_owned()));
                }
            }
        }

        for template in self.templates.values() {
            let has_sid =
                template.content_sid.as_deref().map(|sid| !sid.trim().is_empty()).unwrap_or(false);
            if !template.is_quote_forward() && !has_sid {
                return Err(CatalogError::MissingContentSid(template.name.clone()));
            }
        }

        Ok(())
    }
}
