use serde_json::{Map, Value};

/// One inbound CRM change notification.
///
/// Both the v1 (`current`/`meta.id`) and v2 (`data`/`meta.entity_id`) webhook
/// envelopes are accepted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeEvent {
    pub entity_id: Option<String>,
    current: Snapshot,
    previous: Snapshot,
}

/// Field values of the entity at one point in time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot(Map<String, Value>);

/// Current and previous value of one custom field. `None` means empty or absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldChange {
    pub current: Option<String>,
    pub previous: Option<String>,
}

impl FieldChange {
    /// True when the field went from empty to populated in this change.
    pub fn is_fresh(&self) -> bool {
        self.current.is_some() && self.previous.is_none()
    }
}

impl ChangeEvent {
    pub fn from_json(payload: &Value) -> Self {
        let current = payload
            .get("data")
            .filter(|value| value.is_object())
            .or_else(|| payload.get("current"))
            .map(Snapshot::from_value)
            .unwrap_or_default();
        let previous = payload.get("previous").map(Snapshot::from_value).unwrap_or_default();

        Self { entity_id: resolve_entity_id(payload), current, previous }
    }

    pub fn field(&self, field_id: &str) -> FieldChange {
        FieldChange {
            current: self.current.field_value(field_id),
            previous: self.previous.field_value(field_id),
        }
    }
}

impl Snapshot {
    fn from_value(value: &Value) -> Self {
        Self(value.as_object().cloned().unwrap_or_default())
    }

    /// Trimmed, non-empty text of a custom field. Looks under `custom_fields`
    /// first and falls back to a top-level key.
    pub fn field_value(&self, field_id: &str) -> Option<String> {
        let raw = self
            .0
            .get("custom_fields")
            .and_then(|fields| fields.get(field_id))
            .or_else(|| self.0.get(field_id))?;
        custom_field_text(raw)
    }
}

fn custom_field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(value) => Some(value.to_string()),
        Value::Bool(value) => Some(value.to_string()),
        Value::Object(object) => match object.get("value") {
            Some(Value::Object(_)) | None => None,
            Some(inner) => custom_field_text(inner),
        },
        Value::Null | Value::Array(_) => None,
    }
}

fn resolve_entity_id(payload: &Value) -> Option<String> {
    let candidates = [
        payload.pointer("/meta/entity_id"),
        payload.pointer("/meta/id"),
        payload.pointer("/current/id"),
        payload.pointer("/data/id"),
    ];

    candidates.into_iter().flatten().find_map(|value| match value {
        Value::String(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    })
}
