use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use relay_cli::commands::{config, doctor, render};
use relay_core::config::LoadOptions;
use serde_json::Value;
use tempfile::TempDir;

const VALID_ENV: &[(&str, &str)] = &[
    ("RELAY_CRM_API_KEY", "pd-0123456789abcdef"),
    ("RELAY_MESSAGING_ACCOUNT_SID", "AC0123456789"),
    ("RELAY_MESSAGING_AUTH_TOKEN", "twilio-secret-token-9876"),
    ("RELAY_MESSAGING_SENDER", "+14155238886"),
];

const CATALOG_TOML: &str = r#"
[[triggers]]
field_id = "f_pair"
template = "rate_alert"

[[triggers]]
field_id = "f_orphan"
template = "not_defined"

[templates.rate_alert]
content_sid = "HXRATE"
rule = "currency_pair"

[templates.quote]
rule = "quote_forward"
"#;

#[test]
fn doctor_passes_with_valid_env() {
    with_env(VALID_ENV, || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "expected doctor to pass: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        assert_eq!(payload["checks"][0]["name"], "config_validation");
        assert_eq!(payload["checks"][2]["status"], "skipped");
    });
}

#[test]
fn doctor_fails_without_messaging_credentials() {
    with_env(&[("RELAY_CRM_API_KEY", "pd-0123456789abcdef")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
    });
}

#[test]
fn doctor_warns_about_unresolved_templates() {
    let mut vars = VALID_ENV.to_vec();
    vars.push(("RELAY_QUOTE_ENDPOINT", "https://quotes.example.com/api/quote"));
    vars.push(("RELAY_QUOTE_API_KEY", "quote-key"));

    with_env(&vars, || {
        let (_dir, path) = write_catalog();
        let result = doctor::run_with(options_for(path), false);

        assert_eq!(result.exit_code, 0, "warnings should not fail doctor: {}", result.output);
        assert!(result.output.starts_with("doctor: ready, with warnings"));
        assert!(result.output.contains("not_defined"));
        assert!(result.output.contains("- [ok] quote_forwarding"));
    });
}

#[test]
fn config_output_redacts_secrets_and_attributes_sources() {
    with_env(VALID_ENV, || {
        let output = config::run();

        assert!(output.starts_with("effective config"));
        assert!(!output.contains("pd-0123456789abcdef"));
        assert!(!output.contains("twilio-secret-token-9876"));
        assert!(output.contains("- crm.api_key = ****cdef (source: env (RELAY_CRM_API_KEY))"));
        assert!(output.contains("- server.port = 5000 (source: default)"));
        assert!(output.contains("- quote.endpoint = <unset>"));
    });
}

#[test]
fn config_sources_ignore_blank_and_false_env_values() {
    let mut vars = VALID_ENV.to_vec();
    vars.push(("RELAY_CRM_BASE_URL", "   "));
    vars.push(("RELAY_DEBUG", "false"));

    with_env(&vars, || {
        let output = config::run();

        assert!(output.contains("- crm.base_url = https://api.pipedrive.com/v1 (source: default)"));
        assert!(output.contains("- logging.level = info (source: default)"), "{output}");
    });

    vars.pop();
    vars.push(("RELAY_DEBUG", "1"));
    with_env(&vars, || {
        let output = config::run();
        assert!(output.contains("- logging.level = debug (source: env (RELAY_DEBUG))"), "{output}");
    });
}

#[test]
fn render_uses_catalog_rule_without_credentials() {
    with_env(&[], || {
        let (_dir, path) = write_catalog();
        let result = render::run_with(options_for(path), "rate_alert", "sar/gbp", None);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["rule"], "currency_pair");
        assert_eq!(payload["variables"]["1"], "SAR");
        assert_eq!(payload["variables"]["2"], "GBP");
        assert_eq!(payload["variables"]["3"], "SAR");
    });
}

#[test]
fn render_reports_parse_errors() {
    with_env(&[], || {
        let (_dir, path) = write_catalog();
        let result = render::run_with(options_for(path), "rate_alert", "SARGBPX", None);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "parse_error");
    });
}

#[test]
fn render_forwards_quote_terms() {
    with_env(&[], || {
        let (_dir, path) = write_catalog();
        let result = render::run_with(options_for(path), "quote", "GBPUSD buy 1,000", None);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["quote"]["pair"], "GBPUSD");
        assert_eq!(payload["quote"]["direction"], "buy");
        assert_eq!(payload["quote"]["amount"], 1000.0);
    });
}

#[test]
fn render_rejects_unknown_template() {
    with_env(&[], || {
        let result = render::run("no_such_template", "x", None);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "render");
        assert_eq!(payload["error_class"], "unknown_template");
    });
}

#[test]
fn render_rule_override_skips_catalog_lookup() {
    with_env(&[], || {
        let result = render::run("ad_hoc", "30,001.29 GBP 9", Some("amount-currency-id"));
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["rule"], "amount_currency_id");
        assert_eq!(payload["variables"]["1"], "30001.29");
        assert_eq!(payload["variables"]["2"], "GBP");
        assert_eq!(payload["variables"]["3"], "9");
        assert!(payload["content_sid"].is_null());

        let invalid = render::run("ad_hoc", "x", Some("bogus"));
        assert_eq!(invalid.exit_code, 2);
        assert_eq!(parse_payload(&invalid.output)["error_class"], "invalid_rule");
    });
}

fn write_catalog() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("relay.toml");
    fs::write(&path, CATALOG_TOML).expect("write catalog");
    (dir, path)
}

fn options_for(path: PathBuf) -> LoadOptions {
    LoadOptions { config_path: Some(path), ..LoadOptions::default() }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "RELAY_SERVER_BIND_ADDRESS",
        "RELAY_SERVER_PORT",
        "PORT",
        "RELAY_CRM_BASE_URL",
        "RELAY_CRM_API_KEY",
        "PIPEDRIVE_API_KEY",
        "RELAY_CRM_ACTIVITY_TYPE",
        "RELAY_MESSAGING_BASE_URL",
        "RELAY_MESSAGING_ACCOUNT_SID",
        "TWILIO_ACCOUNT_SID",
        "RELAY_MESSAGING_AUTH_TOKEN",
        "TWILIO_AUTH_TOKEN",
        "RELAY_MESSAGING_SENDER",
        "TWILIO_WHATSAPP_FROM",
        "RELAY_QUOTE_ENDPOINT",
        "RELAY_QUOTE_API_KEY",
        "QUOTE_API_KEY",
        "RELAY_QUOTE_API_KEY_HEADER",
        "RELAY_LOGGING_LEVEL",
        "RELAY_LOG_LEVEL",
        "RELAY_LOGGING_FORMAT",
        "RELAY_LOG_FORMAT",
        "RELAY_DEBUG",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}
