use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogError, TemplateCatalog, TemplateDescriptor, TriggerField};
use crate::render::RenderRule;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub crm: CrmConfig,
    pub messaging: MessagingConfig,
    pub quote: QuoteConfig,
    pub logging: LoggingConfig,
    pub catalog: TemplateCatalog,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub activity_type: String,
}

#[derive(Clone, Debug)]
pub struct MessagingConfig {
    pub base_url: String,
    pub account_sid: String,
    pub auth_token: SecretString,
    pub sender: String,
}

#[derive(Clone, Debug)]
pub struct QuoteConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub api_key_header: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub crm_base_url: Option<String>,
    pub crm_api_key: Option<String>,
    pub messaging_base_url: Option<String>,
    pub messaging_account_sid: Option<String>,
    pub messaging_auth_token: Option<String>,
    pub messaging_sender: Option<String>,
    pub quote_endpoint: Option<String>,
    pub quote_api_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("template catalog is invalid: {0}")]
    Catalog(#[from] CatalogError),
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig { bind_address: "0.0.0.0".to_string(), port: 5000 },
            crm: CrmConfig {
                base_url: "https://api.pipedrive.com/v1".to_string(),
                api_key: String::new().into(),
                activity_type: "whatsapp".to_string(),
            },
            messaging: MessagingConfig {
                base_url: "https://api.twilio.com".to_string(),
                account_sid: String::new(),
                auth_token: String::new().into(),
                sender: String::new(),
            },
            quote: QuoteConfig {
                endpoint: None,
                api_key: None,
                api_key_header: "x-api-key".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            catalog: TemplateCatalog::builtin(),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("relay.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Defaults plus the config file, with only the catalog checked. Used by
    /// tooling that needs templates but no provider credentials.
    pub fn load_catalog(options: &LoadOptions) -> Result<TemplateCatalog, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = resolve_config_path(options.config_path.as_deref()) {
            config.apply_patch(read_patch(&path)?)?;
        } else if options.require_file {
            let expected =
                options.config_path.clone().unwrap_or_else(|| PathBuf::from("relay.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }
        config.catalog.validate()?;
        Ok(config.catalog)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(crm) = patch.crm {
            if let Some(base_url) = crm.base_url {
                self.crm.base_url = base_url;
            }
            if let Some(crm_api_key_value) = crm.api_key {
                self.crm.api_key = secret_value(crm_api_key_value);
            }
            if let Some(activity_type) = crm.activity_type {
                self.crm.activity_type = activity_type;
            }
        }

        if let Some(messaging) = patch.messaging {
            if let Some(base_url) = messaging.base_url {
                self.messaging.base_url = base_url;
            }
            if let Some(account_sid) = messaging.account_sid {
                self.messaging.account_sid = account_sid;
            }
            if let Some(auth_token_value) = messaging.auth_token {
                self.messaging.auth_token = secret_value(auth_token_value);
            }
            if let Some(sender) = messaging.sender {
                self.messaging.sender = sender;
            }
        }

        if let Some(quote) = patch.quote {
            if let Some(endpoint) = quote.endpoint {
                self.quote.endpoint = Some(endpoint);
            }
            if let Some(quote_api_key_value) = quote.api_key {
                self.quote.api_key = Some(secret_value(quote_api_key_value));
            }
            if let Some(api_key_header) = quote.api_key_header {
                self.quote.api_key_header = api_key_header;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(triggers) = patch.triggers {
            let triggers = triggers
                .into_iter()
                .enumerate()
                .map(|(index, trigger)| trigger.into_trigger(index))
                .collect::<Result<Vec<_>, _>>()?;
            self.catalog.replace_triggers(triggers);
        }

        for (name, template) in patch.templates.unwrap_or_default() {
            self.catalog.upsert_template(TemplateDescriptor {
                name,
                content_sid: template.content_sid,
                rule: template.rule,
            });
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("RELAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some((key, value)) = read_env_alias(&["RELAY_SERVER_PORT", "PORT"]) {
            self.server.port = parse_u16(key, &value)?;
        }

        if let Some(value) = read_env("RELAY_CRM_BASE_URL") {
            self.crm.base_url = value;
        }
        if let Some((_, value)) = read_env_alias(&["RELAY_CRM_API_KEY", "PIPEDRIVE_API_KEY"]) {
            self.crm.api_key = secret_value(value);
        }
        if let Some(value) = read_env("RELAY_CRM_ACTIVITY_TYPE") {
            self.crm.activity_type = value;
        }

        if let Some(value) = read_env("RELAY_MESSAGING_BASE_URL") {
            self.messaging.base_url = value;
        }
        if let Some((_, value)) =
            read_env_alias(&["RELAY_MESSAGING_ACCOUNT_SID", "TWILIO_ACCOUNT_SID"])
        {
            self.messaging.account_sid = value;
        }
        if let Some((_, value)) =
            read_env_alias(&["RELAY_MESSAGING_AUTH_TOKEN", "TWILIO_AUTH_TOKEN"])
        {
            self.messaging.auth_token = secret_value(value);
        }
        if let Some((_, value)) =
            read_env_alias(&["RELAY_MESSAGING_SENDER", "TWILIO_WHATSAPP_FROM"])
        {
            self.messaging.sender = value;
        }

        if let Some(value) = read_env("RELAY_QUOTE_ENDPOINT") {
            self.quote.endpoint = Some(value);
        }
        if let Some((_, value)) = read_env_alias(&["RELAY_QUOTE_API_KEY", "QUOTE_API_KEY"]) {
            self.quote.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("RELAY_QUOTE_API_KEY_HEADER") {
            self.quote.api_key_header = value;
        }

        if let Some((_, value)) = read_env_alias(&["RELAY_LOGGING_LEVEL", "RELAY_LOG_LEVEL"]) {
            self.logging.level = value;
        }
        if let Some((_, value)) = read_env_alias(&["RELAY_LOGGING_FORMAT", "RELAY_LOG_FORMAT"]) {
            self.logging.format = value.parse()?;
        }
        if let Some(value) = read_env("RELAY_DEBUG") {
            if parse_bool("RELAY_DEBUG", &value)? {
                self.logging.level = "debug".to_string();
            }
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(base_url) = overrides.crm_base_url {
            self.crm.base_url = base_url;
        }
        if let Some(crm_api_key) = overrides.crm_api_key {
            self.crm.api_key = secret_value(crm_api_key);
        }
        if let Some(base_url) = overrides.messaging_base_url {
            self.messaging.base_url = base_url;
        }
        if let Some(account_sid) = overrides.messaging_account_sid {
            self.messaging.account_sid = account_sid;
        }
        if let Some(auth_token) = overrides.messaging_auth_token {
            self.messaging.auth_token = secret_value(auth_token);
        }
        if let Some(sender) = overrides.messaging_sender {
            self.messaging.sender = sender;
        }
        if let Some(endpoint) = overrides.quote_endpoint {
            self.quote.endpoint = Some(endpoint);
        }
        if let Some(quote_api_key) = overrides.quote_api_key {
            self.quote.api_key = Some(secret_value(quote_api_key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_crm(&self.crm)?;
        validate_messaging(&self.messaging)?;
        validate_quote(&self.quote, &self.catalog)?;
        validate_logging(&self.logging)?;
        self.catalog.validate()?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("relay.toml"), PathBuf::from("config/relay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

/// Path of the config file `AppConfig::load` would pick up, if any.
pub fn detect_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    resolve_config_path(explicit_path)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Expands `${VAR}` references. Whole-line `#` comments are copied through
/// untouched.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());

    for line in input.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            output.push_str(line);
            continue;
        }
        interpolate_line(line, &mut output)?;
    }

    Ok(output)
}

fn interpolate_line(line: &str, output: &mut String) -> Result<(), ConfigError> {
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }
    Ok(())
}

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    validate_http_url("crm.base_url", &crm.base_url)?;

    if crm.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "crm.api_key is required (set RELAY_CRM_API_KEY or PIPEDRIVE_API_KEY)".to_string(),
        ));
    }
    if crm.activity_type.trim().is_empty() {
        return Err(ConfigError::Validation("crm.activity_type must not be empty".to_string()));
    }

    Ok(())
}

fn validate_messaging(messaging: &MessagingConfig) -> Result<(), ConfigError> {
    validate_http_url("messaging.base_url", &messaging.base_url)?;

    if messaging.account_sid.trim().is_empty() {
        return Err(ConfigError::Validation(
            "messaging.account_sid is required (set RELAY_MESSAGING_ACCOUNT_SID or TWILIO_ACCOUNT_SID)"
                .to_string(),
        ));
    }
    if messaging.auth_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "messaging.auth_token is required (set RELAY_MESSAGING_AUTH_TOKEN or TWILIO_AUTH_TOKEN)"
                .to_string(),
        ));
    }
    if messaging.sender.trim().is_empty() {
        return Err(ConfigError::Validation(
            "messaging.sender is required (set RELAY_MESSAGING_SENDER or TWILIO_WHATSAPP_FROM)"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_quote(quote: &QuoteConfig, catalog: &TemplateCatalog) -> Result<(), ConfigError> {
    if let Some(endpoint) = &quote.endpoint {
        validate_http_url("quote.endpoint", endpoint)?;
    }

    if quote.api_key_header.trim().is_empty() {
        return Err(ConfigError::Validation("quote.api_key_header must not be empty".to_string()));
    }

    if catalog.uses_quote_forward() {
        if quote.endpoint.is_none() {
            return Err(ConfigError::Validation(
                "quote.endpoint is required when a template uses the quote_forward rule"
                    .to_string(),
            ));
        }
        let missing_key = quote
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing_key {
            return Err(ConfigError::Validation(
                "quote.api_key is required when a template uses the quote_forward rule".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

/// Value of `key`, ignoring unset and blank variables.
pub fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Whether `RELAY_DEBUG` is set to a true value.
pub fn debug_forced() -> bool {
    read_env("RELAY_DEBUG")
        .and_then(|value| parse_bool("RELAY_DEBUG", &value).ok())
        .unwrap_or(false)
}

/// First non-empty variable among `keys`, with the key that supplied it.
fn read_env_alias<'a>(keys: &[&'a str]) -> Option<(&'a str, String)> {
    keys.iter().find_map(|key| read_env(key).map(|value| (*key, value)))
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    crm: Option<CrmPatch>,
    messaging: Option<MessagingPatch>,
    quote: Option<QuotePatch>,
    logging: Option<LoggingPatch>,
    triggers: Option<Vec<TriggerPatch>>,
    templates: Option<BTreeMap<String, TemplatePatch>>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    activity_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MessagingPatch {
    base_url: Option<String>,
    account_sid: Option<String>,
    auth_token: Option<String>,
    sender: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct QuotePatch {
    endpoint: Option<String>,
    api_key: Option<String>,
    api_key_header: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Deserialize)]
struct TriggerPatch {
    field_id: String,
    template: Option<String>,
    #[serde(default)]
    template_from_value: bool,
}

impl TriggerPatch {
    fn into_trigger(self, index: usize) -> Result<TriggerField, ConfigError> {
        match (self.template, self.template_from_value) {
            (None, true) => Ok(TriggerField::from_value(self.field_id)),
            (Some(template), false) => Ok(TriggerField::fixed(self.field_id, template)),
            (Some(_), true) => Err(ConfigError::Validation(format!(
                "triggers[{index}] sets both template and template_from_value"
            ))),
            (None, false) => Err(ConfigError::Validation(format!(
                "triggers[{index}] needs a template or template_from_value = true"
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TemplatePatch {
    content_sid: Option<String>,
    #[serde(default)]
    rule: RenderRule,
}
