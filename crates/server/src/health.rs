use axum::{routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub checked_at: String,
}

pub fn router() -> Router {
    Router::new().route("/", get(home)).route("/health", get(health))
}

pub async fn home() -> &'static str {
    "Webhook server is running"
}

/// Liveness only. The relay keeps no connections open, so there is nothing
/// downstream to probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "relay-server",
        version: env!("CARGO_PKG_VERSION"),
        checked_at: Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Json,
    };
    use tower::ServiceExt;

    use crate::health::{health, router};

    #[tokio::test]
    async fn health_reports_healthy_with_timestamp() {
        let Json(payload) = health().await;

        assert_eq!(payload.status, "healthy");
        assert_eq!(payload.service, "relay-server");
        assert!(chrono::DateTime::parse_from_rfc3339(&payload.checked_at).is_ok());
    }

    #[tokio::test]
    async fn root_answers_with_plain_banner() {
        let response = router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert_eq!(&body[..], b"Webhook server is running");
    }
}
