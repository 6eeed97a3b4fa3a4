//! Process-wide relay configuration.
//!
//! Built once at startup from defaults, an optional YAML file and environment
//! variables, then shared read-only (`Arc<RelayConfig>`) for the process lifetime.

use crate::{Error, ErrorContext, Result};
use keyring::Entry;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
pub const PLACEHOLDER_API_KEY: &str = "TEST_KEY_DEFAULT";

const KEYRING_SERVICE: &str = "chat-relay";
const KEYRING_USER: &str = "openai";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upstream API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub stream_enabled: bool,
    /// Hard bound on a synchronous completion.
    pub sync_timeout: Duration,
    /// Hard bound on a whole stream, not renewed per chunk.
    pub stream_timeout: Duration,
    pub requests_per_minute: u32,
    pub allowed_origin: String,
    pub bind_addr: String,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: PLACEHOLDER_API_KEY.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 1500,
            temperature: 0.2,
            stream_enabled: true,
            sync_timeout: Duration::from_secs(60),
            stream_timeout: Duration::from_secs(120),
            requests_per_minute: 60,
            allowed_origin: "http://localhost:5173".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

/// On-disk shape. Every field is optional and overrides the default when present.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
    stream_enabled: Option<bool>,
    sync_timeout_secs: Option<u64>,
    stream_timeout_secs: Option<u64>,
    requests_per_minute: Option<u32>,
    allowed_origin: Option<String>,
    bind_addr: Option<String>,
    pool_max_idle_per_host: Option<usize>,
    pool_idle_timeout_secs: Option<u64>,
}

impl RelayConfig {
    /// Defaults, then the YAML file (if any), then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let yaml = match path {
            Some(p) => Some(std::fs::read_to_string(p)?),
            None => None,
        };
        Self::load_with(yaml.as_deref(), |key| std::env::var(key).ok(), lookup_keyring)
    }

    /// Same as [`RelayConfig::load`] with every external source injected.
    pub fn load_with(
        yaml: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
        keyring: impl Fn() -> Option<String>,
    ) -> Result<Self> {
        let mut cfg = Self::default();
        let mut api_key = None;

        if let Some(text) = yaml {
            let file: FileConfig = serde_yaml::from_str(text)?;
            api_key = file.api_key.clone();
            cfg.apply_file(file);
        }

        cfg.apply_env(&env)?;

        cfg.api_key = api_key
            .or_else(keyring)
            .or_else(|| env("OPENAI_API_KEY"))
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| PLACEHOLDER_API_KEY.to_string());

        if cfg.uses_placeholder_key() {
            warn!(
                "Using {} for the upstream credential. Set OPENAI_API_KEY for real requests.",
                PLACEHOLDER_API_KEY
            );
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.base_url {
            self.base_url = v;
        }
        if let Some(v) = file.model {
            self.model = v;
        }
        if let Some(v) = file.max_tokens {
            self.max_tokens = v;
        }
        if let Some(v) = file.temperature {
            self.temperature = v;
        }
        if let Some(v) = file.stream_enabled {
            self.stream_enabled = v;
        }
        if let Some(v) = file.sync_timeout_secs {
            self.sync_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.stream_timeout_secs {
            self.stream_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.requests_per_minute {
            self.requests_per_minute = v;
        }
        if let Some(v) = file.allowed_origin {
            self.allowed_origin = v;
        }
        if let Some(v) = file.bind_addr {
            self.bind_addr = v;
        }
        if let Some(v) = file.pool_max_idle_per_host {
            self.pool_max_idle_per_host = v;
        }
        if let Some(v) = file.pool_idle_timeout_secs {
            self.pool_idle_timeout = Duration::from_secs(v);
        }
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = env("OPENAI_API_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = env("OPENAI_MODEL") {
            self.model = v;
        }
        if let Some(v) = parse_env(env, "OPENAI_MAX_TOKENS")? {
            self.max_tokens = v;
        }
        if let Some(v) = parse_env(env, "OPENAI_TEMPERATURE")? {
            self.temperature = v;
        }
        if let Some(v) = parse_env(env, "OPENAI_STREAM_ENABLED")? {
            self.stream_enabled = v;
        }
        if let Some(v) = parse_env(env, "RATELIMIT_REQUESTS_PER_MINUTE")? {
            self.requests_per_minute = v;
        }
        if let Some(v) = env("CHAT_RELAY_ALLOWED_ORIGIN") {
            self.allowed_origin = v;
        }
        if let Some(v) = env("CHAT_RELAY_BIND") {
            self.bind_addr = v;
        }
        Ok(())
    }

    pub fn uses_placeholder_key(&self) -> bool {
        self.api_key == PLACEHOLDER_API_KEY
    }

    /// Full URL of the completions endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url).map_err(|e| invalid("config.base_url", e.to_string()))?;

        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid(
                "config.temperature",
                format!("expected 0.0..=2.0, got {}", self.temperature),
            ));
        }
        if self.max_tokens == 0 {
            return Err(invalid("config.max_tokens", "must be positive"));
        }
        if self.sync_timeout.is_zero() {
            return Err(invalid("config.sync_timeout", "must be positive"));
        }
        if self.stream_timeout.is_zero() {
            return Err(invalid("config.stream_timeout", "must be positive"));
        }
        if self.requests_per_minute == 0 {
            return Err(invalid("config.requests_per_minute", "must be positive"));
        }
        Ok(())
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot parse {}", key),
                ErrorContext::new()
                    .with_field_path(key)
                    .with_details(e.to_string())
                    .with_source("config_loader"),
            )
        }),
    }
}

fn invalid(field: &str, details: impl Into<String>) -> Error {
    Error::configuration_with_context(
        "invalid relay configuration",
        ErrorContext::new()
            .with_field_path(field)
            .with_details(details)
            .with_source("config_loader"),
    )
}

fn lookup_keyring() -> Option<String> {
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER).ok()?;
    entry.get_password().ok()
}
