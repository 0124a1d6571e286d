//! Configuration management.
//!
//! Settings are loaded once at startup (optional TOML file layered under
//! `PERPLEXITY_*` environment variables) and handed to the engines through the
//! [`ConfigProvider`] trait. Every accessor is queried again on each outbound
//! call, so [`EnvConfigProvider`] picks up environment changes between calls.

mod file_config;

pub use file_config::{default_config_path, find_config_file, write_default_config};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default upstream API root
pub const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";

/// Default per-request deadline in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;

/// Environment variable holding the API credential
pub const API_KEY_VAR: &str = "PERPLEXITY_API_KEY";

/// Environment variable overriding the API root
pub const BASE_URL_VAR: &str = "PERPLEXITY_BASE_URL";

/// Environment variable overriding the request deadline
pub const TIMEOUT_VAR: &str = "PERPLEXITY_TIMEOUT_MS";

/// Environment variable carrying the optional `X-Service` origin header value
pub const SERVICE_ORIGIN_VAR: &str = "PERPLEXITY_SERVICE_ORIGIN";

/// Proxy variables, highest priority first
pub const PROXY_VARS: [&str; 5] = [
    "PERPLEXITY_PROXY",
    "HTTPS_PROXY",
    "https_proxy",
    "HTTP_PROXY",
    "http_proxy",
];

/// Capability that hands out configuration values on demand.
///
/// Implementations must be cheap to query: the dispatcher calls every accessor
/// once per outbound request.
pub trait ConfigProvider: Send + Sync + std::fmt::Debug {
    /// API credential, if one is configured
    fn api_key(&self) -> Option<String>;

    /// API root without a trailing slash
    fn base_url(&self) -> String;

    /// Deadline for a single request, including body streaming
    fn timeout(&self) -> Duration;

    /// Outbound proxy URL, if any
    fn proxy(&self) -> Option<String>;

    /// Value for the `X-Service` header, if any
    fn service_origin(&self) -> Option<String>;

    /// Return the API key or fail with [`ConfigError::MissingApiKey`]
    fn require_api_key(&self) -> Result<String, ConfigError> {
        self.api_key().ok_or(ConfigError::MissingApiKey)
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Perplexity API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// API root (`/chat/completions` and `/search` are appended)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request deadline in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Outbound proxy URL
    #[serde(default)]
    pub proxy: Option<String>,

    /// Optional `X-Service` header value
    #[serde(default)]
    pub service_origin: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            proxy: None,
            service_origin: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Settings {
    /// Settings pointing at `base_url` with the given key, defaults elsewhere
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the request deadline
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the outbound proxy
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Set the `X-Service` header value
    pub fn with_service_origin(mut self, origin: impl Into<String>) -> Self {
        self.service_origin = Some(origin.into());
        self
    }

    /// Check the values that can be checked without a network call
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| ConfigError::InvalidBaseUrl(format!("{}: {}", self.base_url, e)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ConfigError::InvalidBaseUrl(format!(
                "{}: unsupported scheme '{}'",
                self.base_url, other
            ))),
        }
    }
}

impl ConfigProvider for Settings {
    fn api_key(&self) -> Option<String> {
        non_empty(self.api_key.clone())
    }

    fn base_url(&self) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn proxy(&self) -> Option<String> {
        non_empty(self.proxy.clone())
    }

    fn service_origin(&self) -> Option<String> {
        non_empty(self.service_origin.clone())
    }
}

/// Provider that re-reads the process environment on every call, falling back
/// to the settings loaded at startup.
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider {
    fallback: Settings,
}

impl EnvConfigProvider {
    /// Create a provider over the given fallback settings
    pub fn new(fallback: Settings) -> Self {
        Self { fallback }
    }

    fn var(name: &str) -> Option<String> {
        non_empty(std::env::var(name).ok())
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn api_key(&self) -> Option<String> {
        Self::var(API_KEY_VAR).or_else(|| self.fallback.api_key())
    }

    fn base_url(&self) -> String {
        Self::var(BASE_URL_VAR)
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| self.fallback.base_url())
    }

    fn timeout(&self) -> Duration {
        match Self::var(TIMEOUT_VAR) {
            Some(raw) => match parse_timeout_ms(&raw) {
                Some(ms) => Duration::from_millis(ms),
                None => {
                    tracing::warn!("Ignoring invalid {}={:?}", TIMEOUT_VAR, raw);
                    self.fallback.timeout()
                }
            },
            None => self.fallback.timeout(),
        }
    }

    fn proxy(&self) -> Option<String> {
        resolve_proxy(Self::var).or_else(|| self.fallback.proxy())
    }

    fn service_origin(&self) -> Option<String> {
        Self::var(SERVICE_ORIGIN_VAR).or_else(|| self.fallback.service_origin())
    }
}

/// Pick the first non-empty proxy value in [`PROXY_VARS`] priority order.
pub fn resolve_proxy<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    PROXY_VARS
        .iter()
        .find_map(|name| non_empty(lookup(name)))
}

fn parse_timeout_ms(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|ms| *ms > 0)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {API_KEY_VAR} is not set")]
    MissingApiKey,

    #[error("Configuration error: invalid base URL {0}")]
    InvalidBaseUrl(String),

    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Configuration error: IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: serialize: {0}")]
    Serialize(String),
}

/// Load settings from an optional TOML file with `PERPLEXITY_*` environment
/// variables layered on top.
///
/// An unusable `PERPLEXITY_TIMEOUT_MS` is ignored with a warning, the same as
/// [`EnvConfigProvider`] does per call.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    load_settings_from(path, std::env::vars())
}

fn load_settings_from<I>(path: Option<&Path>, vars: I) -> Result<Settings, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let env: config::Map<String, String> = vars
        .into_iter()
        .filter(|(name, value)| {
            if name == TIMEOUT_VAR && parse_timeout_ms(value).is_none() {
                tracing::warn!("Ignoring invalid {}={:?}", TIMEOUT_VAR, value);
                return false;
            }
            true
        })
        .collect();

    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }

    let settings: Settings = builder
        .add_source(config::Environment::with_prefix("PERPLEXITY").source(Some(env)))
        .build()?
        .try_deserialize()?;

    settings.validate()?;
    Ok(settings)
}
