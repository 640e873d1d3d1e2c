use relay_core::GatewayError;
use reqwest::Response;

pub(crate) fn transport_error(error: reqwest::Error) -> GatewayError {
    GatewayError::Transport(error.to_string())
}

/// Drains a non-accepted response into a `Rejected` error carrying the raw body.
pub(crate) async fn rejected(response: Response) -> GatewayError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    GatewayError::Rejected { status, body }
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}
