// =============================================================================
// Settings — typed configuration with serde defaults and env overrides
// =============================================================================
//
// Every tunable of a run lives here: the pairs to report on, the Telegram
// destination, and the knobs of the resilient fetcher and proxy directory.
//
// Values come from an optional JSON file first, then environment variables
// override individual fields.  All fields carry `#[serde(default)]` so that a
// partial (or empty) file still loads.  The bot token is only ever read from
// the environment and is redacted from `Debug` output.
//
// =============================================================================

use std::path::Path;
use std::time::Duration;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::binance::fetcher::FetcherConfig;
use crate::binance::retry::RetryPolicy;
use crate::proxy::{ProxyConfig, DEFAULT_PROXY_SOURCE};

/// Default location of the settings file, relative to the working directory.
pub const DEFAULT_SETTINGS_PATH: &str = "config/settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse settings from {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {key}: expected {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{0}")]
    Missing(&'static str),
}

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_base_urls() -> Vec<String> {
    vec![
        "https://fapi.binance.com".to_string(),
        "https://fapi1.binance.com".to_string(),
        "https://fapi2.binance.com".to_string(),
        "https://fapi3.binance.com".to_string(),
    ]
}

fn default_proxy_limit() -> usize {
    20
}

fn default_proxy_types() -> Vec<String> {
    vec!["http".to_string()]
}

fn default_proxy_source_url() -> String {
    DEFAULT_PROXY_SOURCE.to_string()
}

fn default_proxy_validate_timeout_secs() -> f64 {
    5.0
}

fn default_http_timeout_secs() -> f64 {
    10.0
}

fn default_http_retries() -> u32 {
    3
}

fn default_backoff_factor() -> f64 {
    0.5
}

fn default_max_attempts() -> u32 {
    2
}

fn deserialize_chat_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "telegram_chat_id must be a string or an integer, got {other}"
        ))),
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Everything a run needs, with documented defaults.
#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    // --- Report -------------------------------------------------------------

    /// Trading pairs reported by the scheduled run (upper-cased).
    #[serde(default)]
    pub pairs: Vec<String>,

    /// Telegram chat receiving the report.  The file may give it as a
    /// string or as a number.
    #[serde(default, deserialize_with = "deserialize_chat_id")]
    pub telegram_chat_id: Option<String>,

    /// Telegram bot token.  Environment only.
    #[serde(skip)]
    pub telegram_bot_token: Option<String>,

    // --- Endpoints & proxies -----------------------------------------------

    /// Candidate futures API base URLs, tried in order.
    #[serde(default = "default_base_urls")]
    pub base_urls: Vec<String>,

    /// Route requests through public forward proxies.
    #[serde(default)]
    pub use_proxies: bool,

    /// Keep the direct (no proxy) route in the rotation.
    #[serde(default = "default_true")]
    pub use_direct: bool,

    /// Maximum number of proxies kept from the proxy sources.
    #[serde(default = "default_proxy_limit")]
    pub proxy_limit: usize,

    /// Proxy protocols to request from the source (http, socks4, socks5).
    #[serde(default = "default_proxy_types")]
    pub proxy_types: Vec<String>,

    /// Proxy list URL; `{type}` is replaced by each proxy type.
    #[serde(default = "default_proxy_source_url")]
    pub proxy_source_url: String,

    /// Check each proxy against the exchange ping endpoint before use.
    #[serde(default = "default_true")]
    pub validate_proxies: bool,

    /// Per-proxy liveness check timeout.
    #[serde(default = "default_proxy_validate_timeout_secs")]
    pub proxy_validate_timeout_secs: f64,

    // --- HTTP behaviour -----------------------------------------------------

    /// Per-request timeout.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: f64,

    /// Transport-level retries on connection errors and 429/5xx.
    #[serde(default = "default_http_retries")]
    pub http_retries: u32,

    /// Backoff factor in seconds for both retry layers.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Attempts per (endpoint, proxy) pair.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    // --- Diagnostics --------------------------------------------------------

    /// Raise the default log level to debug.
    #[serde(default)]
    pub debug: bool,

    /// Accept invalid TLS certificates.  Escape hatch for broken proxies;
    /// never enable it against the real exchange unless you have to.
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            telegram_chat_id: None,
            telegram_bot_token: None,
            base_urls: default_base_urls(),
            use_proxies: false,
            use_direct: true,
            proxy_limit: default_proxy_limit(),
            proxy_types: default_proxy_types(),
            proxy_source_url: default_proxy_source_url(),
            validate_proxies: true,
            proxy_validate_timeout_secs: default_proxy_validate_timeout_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            http_retries: default_http_retries(),
            backoff_factor: default_backoff_factor(),
            max_attempts: default_max_attempts(),
            debug: false,
            insecure_skip_tls_verify: false,
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("pairs", &self.pairs)
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field(
                "telegram_bot_token",
                &self.telegram_bot_token.as_ref().map(|_| "<redacted>"),
            )
            .field("base_urls", &self.base_urls)
            .field("use_proxies", &self.use_proxies)
            .field("use_direct", &self.use_direct)
            .field("proxy_limit", &self.proxy_limit)
            .field("proxy_types", &self.proxy_types)
            .field("proxy_source_url", &self.proxy_source_url)
            .field("validate_proxies", &self.validate_proxies)
            .field("proxy_validate_timeout_secs", &self.proxy_validate_timeout_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("http_retries", &self.http_retries)
            .field("backoff_factor", &self.backoff_factor)
            .field("max_attempts", &self.max_attempts)
            .field("debug", &self.debug)
            .field("insecure_skip_tls_verify", &self.insecure_skip_tls_verify)
            .finish()
    }
}

impl Settings {
    /// Load settings from the JSON file at `path` (defaults when the file does
    /// not exist) and apply overrides from the process environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let mut settings = Self::from_file(path)?;
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read the JSON file at `path`.  A missing file yields the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let mut settings: Self =
            serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        settings.pairs = normalize_pairs(settings.pairs.iter().map(String::as_str));
        settings.validate()?;

        info!(path = %path.display(), pairs = ?settings.pairs, "settings loaded");
        Ok(settings)
    }

    /// Override fields from environment-style variables supplied by `lookup`.
    /// Empty values are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = var("PAIRS") {
            let pairs = normalize_pairs(raw.split(','));
            if !pairs.is_empty() {
                self.pairs = pairs;
            }
        }
        if let Some(v) = var("TELEGRAM_CHAT_ID") {
            self.telegram_chat_id = Some(v.trim().to_string());
        }
        if let Some(v) = var("TELEGRAM_BOT_TOKEN") {
            self.telegram_bot_token = Some(v.trim().to_string());
        }
        if let Some(v) = var("BINANCE_BASE_URLS") {
            self.base_urls = split_list(&v);
        }
        if let Some(v) = var("USE_PROXIES") {
            self.use_proxies = parse_bool("USE_PROXIES", &v)?;
        }
        if let Some(v) = var("USE_DIRECT") {
            self.use_direct = parse_bool("USE_DIRECT", &v)?;
        }
        if let Some(v) = var("PROXY_LIMIT") {
            self.proxy_limit = parse_number("PROXY_LIMIT", &v, "a non-negative integer")?;
        }
        if let Some(v) = var("PROXY_TYPES") {
            self.proxy_types = split_list(&v)
                .into_iter()
                .map(|t| t.to_lowercase())
                .collect();
        }
        if let Some(v) = var("PROXY_SOURCE_URL") {
            self.proxy_source_url = v.trim().to_string();
        }
        if let Some(v) = var("VALIDATE_PROXIES") {
            self.validate_proxies = parse_bool("VALIDATE_PROXIES", &v)?;
        }
        if let Some(v) = var("PROXY_VALIDATE_TIMEOUT") {
            self.proxy_validate_timeout_secs = parse_seconds("PROXY_VALIDATE_TIMEOUT", &v)?;
        }
        if let Some(v) = var("HTTP_TIMEOUT") {
            self.http_timeout_secs = parse_seconds("HTTP_TIMEOUT", &v)?;
        }
        if let Some(v) = var("HTTP_RETRIES") {
            self.http_retries = parse_number("HTTP_RETRIES", &v, "a non-negative integer")?;
        }
        if let Some(v) = var("HTTP_BACKOFF") {
            self.backoff_factor = parse_seconds("HTTP_BACKOFF", &v)?;
        }
        if let Some(v) = var("MAX_ATTEMPTS") {
            self.max_attempts = parse_number("MAX_ATTEMPTS", &v, "a non-negative integer")?;
        }
        if let Some(v) = var("DEBUG") {
            self.debug = parse_bool("DEBUG", &v)?;
        }
        if let Some(v) = var("INSECURE_SKIP_TLS_VERIFY") {
            self.insecure_skip_tls_verify = parse_bool("INSECURE_SKIP_TLS_VERIFY", &v)?;
        }

        Ok(())
    }

    /// Check that every duration field is a non-negative number of seconds
    /// that fits a `Duration`.
    pub fn validate(&self) -> Result<(), SettingsError> {
        check_seconds("http_timeout_secs", self.http_timeout_secs)?;
        check_seconds("proxy_validate_timeout_secs", self.proxy_validate_timeout_secs)?;
        check_seconds("backoff_factor", self.backoff_factor)?;
        Ok(())
    }

    /// Pairs for the scheduled report; an empty list is a configuration error.
    pub fn require_pairs(&self) -> Result<&[String], SettingsError> {
        if self.pairs.is_empty() {
            return Err(SettingsError::Missing(
                "pairs are not configured; set PAIRS or \"pairs\" in the settings file",
            ));
        }
        Ok(&self.pairs)
    }

    /// Telegram `(chat_id, bot_token)`, both required to send anything.
    pub fn require_telegram(&self) -> Result<(&str, &str), SettingsError> {
        let chat_id = self.telegram_chat_id.as_deref().ok_or(SettingsError::Missing(
            "telegram chat id is missing; set TELEGRAM_CHAT_ID or \"telegram_chat_id\"",
        ))?;
        let token = self.telegram_bot_token.as_deref().ok_or(SettingsError::Missing(
            "telegram bot token is missing; set TELEGRAM_BOT_TOKEN",
        ))?;
        Ok((chat_id, token))
    }

    /// Proxy directory settings, or `None` when proxies are disabled.
    pub fn proxy_config(&self) -> Option<ProxyConfig> {
        if !self.use_proxies {
            return None;
        }
        Some(ProxyConfig {
            limit: self.proxy_limit,
            types: self.proxy_types.clone(),
            source_url: self.proxy_source_url.clone(),
            validate: self.validate_proxies,
            validate_timeout: seconds_or(self.proxy_validate_timeout_secs, default_proxy_validate_timeout_secs()),
        })
    }

    /// Fetcher settings derived from this configuration.
    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            base_urls: self.base_urls.clone(),
            use_direct: self.use_direct,
            proxies: self.proxy_config(),
            timeout: seconds_or(self.http_timeout_secs, default_http_timeout_secs()),
            retry: RetryPolicy::new(self.http_retries, self.backoff_factor),
            max_attempts: self.max_attempts.max(1),
            backoff_factor: self.backoff_factor,
            insecure_skip_tls_verify: self.insecure_skip_tls_verify,
        }
    }
}

// =============================================================================
// Parsing helpers
// =============================================================================

fn normalize_pairs<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    raw.map(|p| p.trim().to_uppercase())
        .filter(|p| !p.is_empty())
        .collect()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, SettingsError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::InvalidValue {
            key,
            value: raw.to_string(),
            expected: "true/false",
        }),
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &'static str,
    raw: &str,
    expected: &'static str,
) -> Result<T, SettingsError> {
    raw.trim().parse().map_err(|_| SettingsError::InvalidValue {
        key,
        value: raw.to_string(),
        expected,
    })
}

const SECONDS_EXPECTED: &str = "a non-negative number of seconds";

fn parse_seconds(key: &'static str, raw: &str) -> Result<f64, SettingsError> {
    let secs: f64 = parse_number(key, raw, SECONDS_EXPECTED)?;
    check_seconds(key, secs)
}

fn check_seconds(key: &'static str, secs: f64) -> Result<f64, SettingsError> {
    if secs < 0.0 || Duration::try_from_secs_f64(secs).is_err() {
        return Err(SettingsError::InvalidValue {
            key,
            value: secs.to_string(),
            expected: SECONDS_EXPECTED,
        });
    }
    Ok(secs)
}

/// `secs` as a `Duration`, or `fallback` seconds when it does not fit.
fn seconds_or(secs: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(secs)
        .or_else(|_| Duration::try_from_secs_f64(fallback))
        .unwrap_or(Duration::ZERO)
}
