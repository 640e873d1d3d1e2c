//! Pipedrive-backed CRM gateway.

use async_trait::async_trait;
use relay_core::config::CrmConfig;
use relay_core::{ActivityNote, Contact, CrmGateway, GatewayError};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::outbound::{join_url, rejected, transport_error};

#[derive(Clone)]
pub struct PipedriveClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct PersonEnvelope {
    data: Option<PersonRecord>,
}

#[derive(Debug, Deserialize)]
struct PersonRecord {
    #[serde(default)]
    phone: Vec<PhoneEntry>,
}

#[derive(Debug, Deserialize)]
struct PhoneEntry {
    value: Option<String>,
}

impl PipedriveClient {
    pub fn new(client: Client, config: &CrmConfig) -> Self {
        Self { client, base_url: config.base_url.clone(), api_key: config.api_key.clone() }
    }

    fn auth_query(&self) -> [(&'static str, &str); 1] {
        [("api_token", self.api_key.expose_secret())]
    }
}

#[async_trait]
impl CrmGateway for PipedriveClient {
    async fn find_contact(&self, entity_id: &str) -> Result<Option<Contact>, GatewayError> {
        let url = join_url(&self.base_url, &format!("persons/{entity_id}"));
        let response = self
            .client
            .get(&url)
            .query(&self.auth_query())
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let envelope: PersonEnvelope = response
            .json()
            .await
            .map_err(|error| GatewayError::Decode(format!("person payload: {error}")))?;

        Ok(envelope.data.map(|person| Contact {
            entity_id: entity_id.to_string(),
            phones: person
                .phone
                .into_iter()
                .filter_map(|entry| entry.value)
                .filter(|value| !value.trim().is_empty())
                .collect(),
        }))
    }

    async fn clear_field(&self, entity_id: &str, field_id: &str) -> Result<(), GatewayError> {
        let url = join_url(&self.base_url, &format!("persons/{entity_id}"));
        let mut body = Map::new();
        body.insert(field_id.to_string(), Value::String(String::new()));

        let response = self
            .client
            .put(&url)
            .query(&self.auth_query())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        debug!(event_name = "crm.field.cleared", entity_id, field_id, "trigger field cleared");
        Ok(())
    }

    async fn log_activity(&self, activity: &ActivityNote) -> Result<(), GatewayError> {
        let url = join_url(&self.base_url, "activities");
        let response = self
            .client
            .post(&url)
            .query(&self.auth_query())
            .json(&activity_payload(activity))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(())
    }
}

fn activity_payload(activity: &ActivityNote) -> Value {
    // Pipedrive ids are numeric; keep anything else verbatim.
    let person_id = activity
        .entity_id
        .parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(activity.entity_id.clone()));

    json!({
        "subject": activity.subject,
        "done": if activity.done { 1 } else { 0 },
        "person_id": person_id,
        "note": activity.note,
        "type": activity.activity_type,
    })
}

#[cfg(test)]
mod tests {
    use relay_core::ActivityNote;
    use serde_json::json;

    use super::{activity_payload, PersonEnvelope};

    #[test]
    fn activity_payload_uses_numeric_person_id_and_flag_done() {
        let note = ActivityNote {
            entity_id: "42".to_string(),
            subject: "WhatsApp template `24hrs` sent".to_string(),
            note: "Template: 24hrs".to_string(),
            activity_type: "whatsapp".to_string(),
            done: true,
        };

        assert_eq!(
            activity_payload(&note),
            json!({
                "subject": "WhatsApp template `24hrs` sent",
                "done": 1,
                "person_id": 42,
                "note": "Template: 24hrs",
                "type": "whatsapp",
            })
        );
    }

    #[test]
    fn person_envelope_tolerates_missing_data_and_phone_values() {
        let missing: PersonEnvelope =
            serde_json::from_value(json!({ "success": false, "data": null })).expect("decodes");
        assert!(missing.data.is_none());

        let person: PersonEnvelope = serde_json::from_value(json!({
            "data": { "id": 7, "phone": [{ "value": "+44 7700 900123", "primary": true }, {}] }
        }))
        .expect("decodes");
        let phones = person.data.expect("person").phone;
        assert_eq!(phones.len(), 2);
        assert_eq!(phones[0].value.as_deref(), Some("+44 7700 900123"));
        assert!(phones[1].value.is_none());
    }
}
