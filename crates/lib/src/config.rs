//! Configuration types and loading.
//!
//! Config is loaded once at startup from a JSON file (e.g. `~/.linegpt/config.json`)
//! and then overlaid with environment variables. The resulting [`Config`] is passed
//! into the gateway; request handling never reads the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Public app settings (redirect URL, webhook path, debug).
    #[serde(default)]
    pub app: AppConfig,

    /// LINE Messaging API credentials.
    #[serde(default)]
    pub line: LineConfig,

    /// Completion provider settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Where `/info` looks up the latest published version.
    #[serde(default)]
    pub version: VersionConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 3000). Overridden by APP_PORT.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0", all interfaces). Overridden by APP_BIND.
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// When set, `GET /` redirects here.
    pub url: Option<String>,
    /// Route LINE posts webhook events to (default "/webhook").
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    /// Record prompt/completion pairs and print them after each webhook response.
    #[serde(default)]
    pub debug: bool,
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            url: None,
            webhook_path: default_webhook_path(),
            debug: false,
        }
    }
}

/// LINE channel credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineConfig {
    /// Long-lived channel access token (bearer for the reply API).
    pub channel_access_token: Option<String>,
    /// Channel secret used to verify `x-line-signature`.
    pub channel_secret: Option<String>,
    /// Messaging API base URL (default https://api.line.me).
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    /// Completion model, usually a fine-tuned model name.
    pub model: Option<String>,
    /// API base URL (default https://api.openai.com/v1).
    pub base_url: Option<String>,
    /// Cap on generated tokens per reply (default 150).
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    150
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            base_url: None,
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionConfig {
    /// JSON document holding the latest version (default: crates.io API for this crate).
    pub registry_url: Option<String>,
}

/// Credentials the relay cannot run without, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub channel_secret: String,
    pub channel_access_token: String,
    pub api_key: String,
    pub model: String,
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("LINEGPT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".linegpt").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or the default path), then apply environment
/// overrides. Missing file => defaults. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok((config, path))
}

/// Overlay environment values onto `config`. `lookup` is `std::env::var` in production.
/// Empty or whitespace-only values are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| {
        lookup(key)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    if let Some(v) = get("APP_URL") {
        config.app.url = Some(v);
    }
    if let Some(v) = get("APP_WEBHOOK_PATH") {
        config.app.webhook_path = v;
    }
    if let Some(v) = get("APP_DEBUG") {
        config.app.debug = parse_flag(&v);
    }
    if let Some(v) = get("APP_PORT") {
        config.gateway.port = v
            .parse()
            .with_context(|| format!("APP_PORT is not a valid port: {}", v))?;
    }
    if let Some(v) = get("APP_BIND") {
        config.gateway.bind = v;
    }
    if let Some(v) = get("LINE_CHANNEL_ACCESS_TOKEN") {
        config.line.channel_access_token = Some(v);
    }
    if let Some(v) = get("LINE_CHANNEL_SECRET") {
        config.line.channel_secret = Some(v);
    }
    if let Some(v) = get("LINE_API_BASE") {
        config.line.api_base = Some(v);
    }
    if let Some(v) = get("OPENAI_API_KEY") {
        config.openai.api_key = Some(v);
    }
    if let Some(v) = get("OPENAI_FINE_TUNED_MODEL_NAME") {
        config.openai.model = Some(v);
    }
    if let Some(v) = get("OPENAI_BASE_URL") {
        config.openai.base_url = Some(v);
    }
    if let Some(v) = get("OPENAI_MAX_TOKENS") {
        config.openai.max_tokens = v
            .parse()
            .with_context(|| format!("OPENAI_MAX_TOKENS is not a number: {}", v))?;
    }
    if let Some(v) = get("VERSION_REGISTRY_URL") {
        config.version.registry_url = Some(v);
    }
    Ok(())
}

fn parse_flag(v: &str) -> bool {
    matches!(
        v.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Webhook route as axum expects it: leading slash, no trailing slash (except "/").
pub fn normalized_webhook_path(config: &Config) -> String {
    let p = config.app.webhook_path.trim().trim_end_matches('/');
    if p.is_empty() {
        "/".to_string()
    } else if p.starts_with('/') {
        p.to_string()
    } else {
        format!("/{}", p)
    }
}

/// Collect the credentials the relay needs. Fails with every missing key listed.
pub fn require_relay_settings(config: &Config) -> Result<RelaySettings> {
    fn present(v: &Option<String>) -> Option<String> {
        v.as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    let channel_secret = present(&config.line.channel_secret);
    let channel_access_token = present(&config.line.channel_access_token);
    let api_key = present(&config.openai.api_key);
    let model = present(&config.openai.model);

    let mut missing = Vec::new();
    if channel_secret.is_none() {
        missing.push("line.channelSecret (LINE_CHANNEL_SECRET)");
    }
    if channel_access_token.is_none() {
        missing.push("line.channelAccessToken (LINE_CHANNEL_ACCESS_TOKEN)");
    }
    if api_key.is_none() {
        missing.push("openai.apiKey (OPENAI_API_KEY)");
    }
    if model.is_none() {
        missing.push("openai.model (OPENAI_FINE_TUNED_MODEL_NAME)");
    }

    match (channel_secret, channel_access_token, api_key, model) {
        (Some(channel_secret), Some(channel_access_token), Some(api_key), Some(model)) => {
            Ok(RelaySettings {
                channel_secret,
                channel_access_token,
                api_key,
                model,
            })
        }
        _ => anyhow::bail!("missing required settings: {}", missing.join(", ")),
    }
}
