use std::fs;
use std::path::Path;

use relay_core::config::{debug_forced, detect_config_path, read_env, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    run_with(LoadOptions::default())
}

pub fn run_with(options: LoadOptions) -> String {
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", &["RELAY_SERVER_BIND_ADDRESS"]),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", &["RELAY_SERVER_PORT", "PORT"]),
    ));

    lines.push(render_line(
        "crm.base_url",
        &config.crm.base_url,
        source("crm.base_url", &["RELAY_CRM_BASE_URL"]),
    ));
    lines.push(render_line(
        "crm.api_key",
        &redact_secret(config.crm.api_key.expose_secret()),
        source("crm.api_key", &["RELAY_CRM_API_KEY", "PIPEDRIVE_API_KEY"]),
    ));
    lines.push(render_line(
        "crm.activity_type",
        &config.crm.activity_type,
        source("crm.activity_type", &["RELAY_CRM_ACTIVITY_TYPE"]),
    ));

    lines.push(render_line(
        "messaging.base_url",
        &config.messaging.base_url,
        source("messaging.base_url", &["RELAY_MESSAGING_BASE_URL"]),
    ));
    lines.push(render_line(
        "messaging.account_sid",
        &redact_secret(&config.messaging.account_sid),
        source("messaging.account_sid", &["RELAY_MESSAGING_ACCOUNT_SID", "TWILIO_ACCOUNT_SID"]),
    ));
    lines.push(render_line(
        "messaging.auth_token",
        &redact_secret(config.messaging.auth_token.expose_secret()),
        source("messaging.auth_token", &["RELAY_MESSAGING_AUTH_TOKEN", "TWILIO_AUTH_TOKEN"]),
    ));
    lines.push(render_line(
        "messaging.sender",
        &config.messaging.sender,
        source("messaging.sender", &["RELAY_MESSAGING_SENDER", "TWILIO_WHATSAPP_FROM"]),
    ));

    lines.push(render_line(
        "quote.endpoint",
        config.quote.endpoint.as_deref().unwrap_or("<unset>"),
        source("quote.endpoint", &["RELAY_QUOTE_ENDPOINT"]),
    ));
    let quote_api_key = match &config.quote.api_key {
        Some(key) => redact_secret(key.expose_secret()),
        None => "<unset>".to_string(),
    };
    lines.push(render_line(
        "quote.api_key",
        &quote_api_key,
        source("quote.api_key", &["RELAY_QUOTE_API_KEY", "QUOTE_API_KEY"]),
    ));
    lines.push(render_line(
        "quote.api_key_header",
        &config.quote.api_key_header,
        source("quote.api_key_header", &["RELAY_QUOTE_API_KEY_HEADER"]),
    ));

    let level_keys: &[&str] = if debug_forced() {
        &["RELAY_DEBUG"]
    } else {
        &["RELAY_LOGGING_LEVEL", "RELAY_LOG_LEVEL"]
    };
    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", level_keys),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["RELAY_LOGGING_FORMAT", "RELAY_LOG_FORMAT"]),
    ));

    lines.push(render_line(
        "triggers",
        &format!("{} field(s)", config.catalog.triggers().len()),
        source("triggers", &[]),
    ));
    lines.push(render_line(
        "templates",
        &format!("{} template(s)", config.catalog.templates().count()),
        source("templates", &[]),
    ));

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| read_env(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the last four characters of long secrets so operators can tell
/// credentials apart.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= 8 {
        return "<redacted>".to_string();
    }

    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}
