//! Inbound webhook routes. Every handler answers `200 OK`; outcomes travel in
//! the JSON body so the CRM never retries a delivery.

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    routing::post,
    Json, Router,
};
use relay_core::{ChangeEvent, CommentReport, DispatchOutcome, Relay, RelayReport};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

pub fn router(relay: Relay) -> Router {
    Router::new()
        .route("/pd-webhook", post(crm_change))
        .route("/front-webhook", post(comment).get(comment_ping))
        .with_state(relay)
}

fn correlation_id() -> String {
    format!("req-{}", Uuid::new_v4().simple())
}

pub async fn crm_change(State(relay): State<Relay>, body: Bytes) -> Json<RelayReport> {
    let correlation_id = correlation_id();

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(
                event_name = "webhook.crm.invalid_payload",
                correlation_id = %correlation_id,
                error = %error,
                "crm webhook body is not valid JSON"
            );
            return Json(RelayReport::noop("invalid JSON payload"));
        }
    };

    let event = ChangeEvent::from_json(&payload);
    let report = relay.handle_change(&event, &correlation_id).await;

    info!(
        event_name = "webhook.crm.completed",
        correlation_id = %correlation_id,
        entity_id = report.entity_id.as_deref().unwrap_or("unknown"),
        fired = report.results.len(),
        sent = report.count(DispatchOutcome::Sent),
        "crm change processed"
    );
    Json(report)
}

pub async fn comment(
    State(relay): State<Relay>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<CommentReport> {
    let correlation_id = correlation_id();

    if !is_json(&headers) {
        info!(
            event_name = "webhook.comment.non_json",
            correlation_id = %correlation_id,
            "ignoring non-JSON comment delivery"
        );
        return Json(CommentReport::noop());
    }

    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let text = payload.get("body").and_then(Value::as_str);
    let recipient = payload
        .get("recipient")
        .and_then(|recipient| recipient.get("handle"))
        .and_then(Value::as_str);

    let (Some(text), Some(recipient)) = (text, recipient) else {
        info!(
            event_name = "webhook.comment.ping",
            correlation_id = %correlation_id,
            "comment delivery without body or recipient treated as ping"
        );
        return Json(CommentReport::noop());
    };

    Json(relay.relay_comment(text, recipient, &correlation_id).await)
}

pub async fn comment_ping() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_ascii_lowercase())
        .map(|value| value.starts_with("application/json") || value.contains("+json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header::CONTENT_TYPE, Method, Request, StatusCode},
        Router,
    };
    use relay_core::{
        ActivityNote, Contact, CrmGateway, GatewayError, MessagingGateway, Relay, RelaySettings,
        RenderedMessage, TemplateCatalog,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::router;

    const TRIGGER_FIELD: &str = "cd83bf5536c29ee8f207e865c81fbad299472bfc";

    #[derive(Default)]
    struct FakeCrm {
        cleared: Mutex<Vec<(String, String)>>,
        activities: Mutex<Vec<ActivityNote>>,
    }

    #[async_trait]
    impl CrmGateway for FakeCrm {
        async fn find_contact(&self, entity_id: &str) -> Result<Option<Contact>, GatewayError> {
            if entity_id == "404" {
                return Ok(None);
            }
            Ok(Some(Contact {
                entity_id: entity_id.to_string(),
                phones: vec!["+44 7700 900123".to_string()],
            }))
        }

        async fn clear_field(&self, entity_id: &str, field_id: &str) -> Result<(), GatewayError> {
            self.cleared.lock().expect("lock").push((entity_id.to_string(), field_id.to_string()));
            Ok(())
        }

        async fn log_activity(&self, activity: &ActivityNote) -> Result<(), GatewayError> {
            self.activities.lock().expect("lock").push(activity.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeMessaging {
        sent: Mutex<Vec<RenderedMessage>>,
        reject_with: Option<String>,
    }

    #[async_trait]
    impl MessagingGateway for FakeMessaging {
        async fn send_template(&self, message: &RenderedMessage) -> Result<String, GatewayError> {
            if let Some(body) = &self.reject_with {
                return Err(GatewayError::Rejected { status: 400, body: body.clone() });
            }
            self.sent.lock().expect("lock").push(message.clone());
            Ok(r#"{"sid":"SM123"}"#.to_string())
        }
    }

    struct Harness {
        router: Router,
        crm: Arc<FakeCrm>,
        messaging: Arc<FakeMessaging>,
    }

    fn harness(messaging: FakeMessaging) -> Harness {
        let crm = Arc::new(FakeCrm::default());
        let messaging = Arc::new(messaging);
        let relay = Relay::new(
            Arc::new(TemplateCatalog::builtin()),
            RelaySettings::default(),
            crm.clone(),
            messaging.clone(),
        );
        Harness { router: router(relay), crm, messaging }
    }

    async fn post(
        router: Router,
        uri: &str,
        content_type: &str,
        body: &str,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body.to_string()))
            .expect("request");
        let response = router.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn invalid_crm_payload_is_a_noop_with_200() {
        let harness = harness(FakeMessaging::default());

        let (status, body) =
            post(harness.router, "/pd-webhook", "application/json", "{not json").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "noop");
        assert!(harness.messaging.sent.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn fresh_trigger_value_sends_template_and_clears_field() {
        let harness = harness(FakeMessaging::default());
        let payload = json!({
            "current": { "id": 41, TRIGGER_FIELD: "payment_released 500 GBP" },
            "previous": { "id": 41, TRIGGER_FIELD: null },
            "meta": { "id": 41 }
        });

        let (status, body) =
            post(harness.router, "/pd-webhook", "application/json", &payload.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "done");
        assert_eq!(body["entity_id"], "41");
        assert_eq!(body["results"][0]["outcome"], "sent");

        let sent = harness.messaging.sent.lock().expect("lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "+447700900123");
        assert_eq!(sent[0].content_sid, "HX6b4482f404e6b063984df49dc3b3e69c");
        assert_eq!(sent[0].variables.get(1), Some("500 GBP"));

        let cleared = harness.crm.cleared.lock().expect("lock");
        assert_eq!(cleared.as_slice(), &[("41".to_string(), TRIGGER_FIELD.to_string())]);
        assert_eq!(harness.crm.activities.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn bare_template_name_is_a_parse_error_and_stays_dirty() {
        let harness = harness(FakeMessaging::default());
        let payload = json!({
            "current": { "id": 41, TRIGGER_FIELD: "payment_released" },
            "previous": { "id": 41, TRIGGER_FIELD: null },
            "meta": { "id": 41 }
        });

        let (status, body) =
            post(harness.router, "/pd-webhook", "application/json", &payload.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "done");
        assert_eq!(body["results"][0]["outcome"], "parse_error");
        assert!(harness.messaging.sent.lock().expect("lock").is_empty());
        assert!(harness.crm.cleared.lock().expect("lock").is_empty());
        assert!(harness.crm.activities.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn missing_person_reports_error_without_sending() {
        let harness = harness(FakeMessaging::default());
        let payload = json!({
            "current": { TRIGGER_FIELD: "payment_released 500 GBP" },
            "meta": { "id": 404 }
        });

        let (status, body) =
            post(harness.router, "/pd-webhook", "application/json", &payload.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert!(harness.messaging.sent.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn non_json_comment_delivery_is_a_noop() {
        let harness = harness(FakeMessaging::default());

        let (status, body) =
            post(harness.router, "/front-webhook", "text/plain", "payment_released 10").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "noop" }));
    }

    #[tokio::test]
    async fn comment_ping_without_recipient_is_a_noop() {
        let harness = harness(FakeMessaging::default());

        let (_, body) = post(
            harness.router,
            "/front-webhook",
            "application/json",
            r#"{"type":"ping"}"#,
        )
        .await;

        assert_eq!(body, json!({ "status": "noop" }));
    }

    #[tokio::test]
    async fn comment_relays_remainder_as_first_slot() {
        let harness = harness(FakeMessaging::default());
        let payload = json!({
            "body": "settlement_received 1200 USD",
            "recipient": { "handle": "+44 7700 900123" }
        });

        let (_, body) = post(
            harness.router,
            "/front-webhook",
            "application/json; charset=utf-8",
            &payload.to_string(),
        )
        .await;

        assert_eq!(body, json!({ "status": "success" }));
        let sent = harness.messaging.sent.lock().expect("lock");
        assert_eq!(sent[0].content_sid, "HX706c585bc08250b45418ae5c6da063a9");
        assert_eq!(sent[0].variables.get(1), Some("1200 USD"));
    }

    #[tokio::test]
    async fn comment_provider_rejection_is_reported_with_details() {
        let harness = harness(FakeMessaging {
            reject_with: Some("invalid content sid".to_string()),
            ..FakeMessaging::default()
        });
        let payload = json!({
            "body": "payment_released 99 EUR",
            "recipient": { "handle": "+447700900123" }
        });

        let (status, body) =
            post(harness.router, "/front-webhook", "application/json", &payload.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "error", "details": "invalid content sid" }));
    }

    #[tokio::test]
    async fn comment_endpoint_answers_verification_get() {
        let harness = harness(FakeMessaging::default());
        let request =
            Request::builder().uri("/front-webhook").body(Body::empty()).expect("request");

        let response = harness.router.oneshot(request).await.expect("response");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");

        let body: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body, json!({ "status": "ok" }));
    }
}
