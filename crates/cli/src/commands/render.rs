//! Dry run of the renderer against the configured catalog. No network calls.

use relay_core::config::{AppConfig, LoadOptions};
use relay_core::{RenderRule, Rendered};
use serde_json::json;

use super::{serialize_payload, CommandResult};

const COMMAND: &str = "render";

pub fn run(template: &str, raw: &str, rule: Option<&str>) -> CommandResult {
    run_with(LoadOptions::default(), template, raw, rule)
}

/// With `rule_override` the template need not exist in the catalog.
pub fn run_with(
    options: LoadOptions,
    template: &str,
    raw: &str,
    rule_override: Option<&str>,
) -> CommandResult {
    let catalog = match AppConfig::load_catalog(&options) {
        Ok(catalog) => catalog,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2)
        }
    };
    let descriptor = catalog.template(template);

    let rule = match (rule_override, descriptor) {
        (Some(rule), _) => match rule.parse::<RenderRule>() {
            Ok(rule) => rule,
            Err(message) => return CommandResult::failure(COMMAND, "invalid_rule", message, 2),
        },
        (None, Some(descriptor)) => descriptor.rule,
        (None, None) => {
            return CommandResult::failure(
                COMMAND,
                "unknown_template",
                format!("template `{template}` is not in the catalog"),
                2,
            );
        }
    };
    let content_sid = descriptor.and_then(|descriptor| descriptor.content_sid.clone());

    let rendered = match rule.render(template, raw) {
        Ok(rendered) => rendered,
        Err(error) => return CommandResult::failure(COMMAND, "parse_error", error.to_string(), 1),
    };

    let payload = match rendered {
        Rendered::Variables(slots) => json!({
            "command": COMMAND,
            "status": "ok",
            "template": template,
            "rule": rule.as_str(),
            "content_sid": content_sid,
            "variables": slots,
        }),
        Rendered::Quote(terms) => json!({
            "command": COMMAND,
            "status": "ok",
            "template": template,
            "rule": rule.as_str(),
            "quote": terms,
        }),
    };

    CommandResult { exit_code: 0, output: serialize_payload(&payload) }
}
