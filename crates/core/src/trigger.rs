use crate::catalog::{TriggerField, TriggerTemplate};
use crate::domain::event::ChangeEvent;
use crate::errors::RelayError;

/// One trigger field that transitioned from empty to populated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Firing {
    pub field_id: String,
    pub template: String,
    pub raw: String,
    /// Set when a template-from-value field holds only a template name.
    pub bare_template: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extraction {
    pub entity_id: String,
    pub firings: Vec<Firing>,
}

/// Walks the trigger table in order and keeps the edge-triggered fields.
///
/// A field fires only when its current value is non-empty and its previous
/// value was empty or absent. An event without entity id yields no firings.
pub fn extract_firings(
    event: &ChangeEvent,
    triggers: &[TriggerField],
) -> Result<Extraction, RelayError> {
    let entity_id = event.entity_id.clone().ok_or(RelayError::MissingEntityId)?;

    let firings = triggers
        .iter()
        .filter_map(|trigger| {
            let change = event.field(&trigger.field_id);
            if !change.is_fresh() {
                return None;
            }
            let current = change.current?;
            Some(firing_for(trigger, current))
        })
        .collect();

    Ok(Extraction { entity_id, firings })
}

fn firing_for(trigger: &TriggerField, current: String) -> Firing {
    match &trigger.template {
        TriggerTemplate::Fixed(template) => Firing {
            field_id: trigger.field_id.clone(),
            template: template.clone(),
            raw: current,
            bare_template: false,
        },
        TriggerTemplate::FromValue => {
            let current = current.trim();
            let (template, raw) = match current.split_once(char::is_whitespace) {
                Some((template, raw)) => (template, raw.trim()),
                None => (current, ""),
            };
            Firing {
                field_id: trigger.field_id.clone(),
                template: template.to_string(),
                raw: raw.to_string(),
                bare_template: raw.is_empty(),
            }
        }
    }
}
