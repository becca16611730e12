//! Client configuration structs
//!
//! Loads configuration from environment variables (and an optional `.env` file).

use serde::Deserialize;
use std::env;
use std::ops::Range;
use std::str::FromStr;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub app: AppSettings,
    pub http: HttpConfig,
    pub gateway: GatewayConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// REST dispatcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub token: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Retries for network failures and server errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Retries after "too many requests" responses
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
    /// Process-wide request ceiling; `None` relies on server lockouts only
    #[serde(default = "default_global_requests_per_second")]
    pub global_requests_per_second: Option<u32>,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: BackoffConfig,
}

impl HttpConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Gateway (shard) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Overrides the URL returned by the REST API
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: u8,
    #[serde(default)]
    pub intents: u64,
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u16,
    /// Overrides the recommended shard count
    #[serde(default)]
    pub shard_count: Option<u32>,
    /// Shards owned by this process; all shards when unset
    #[serde(default)]
    pub shard_range: Option<Range<u32>>,
    /// Overrides the server-provided identify concurrency
    #[serde(default)]
    pub max_identify_concurrency: Option<u32>,
    #[serde(default = "default_identify_interval_ms")]
    pub identify_interval_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_heartbeat_jitter_ms")]
    pub heartbeat_jitter_ms: u64,
    #[serde(default = "default_max_missed_heartbeat_acks")]
    pub max_missed_heartbeat_acks: u32,
    #[serde(default = "default_malformed_event_threshold")]
    pub malformed_event_threshold: u32,
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff: BackoffConfig,
    /// JSON file used to persist resume state across restarts
    #[serde(default)]
    pub resume_store_path: Option<String>,
}

impl GatewayConfig {
    #[must_use]
    pub fn identify_interval(&self) -> Duration {
        Duration::from_millis(self.identify_interval_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn heartbeat_jitter(&self) -> Duration {
        Duration::from_millis(self.heartbeat_jitter_ms)
    }
}

/// Exponential backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Fraction of the computed delay used as +/- jitter (0.0 - 1.0)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl BackoffConfig {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base_ms: base.as_millis() as u64,
            max_ms: max.as_millis() as u64,
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }

    /// Same delays, no randomness
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    #[must_use]
    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    #[must_use]
    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        default_reconnect_backoff()
    }
}

// Default value functions
fn default_app_name() -> String {
    "courier".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_api_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_rate_limit_retries() -> u32 {
    5
}

#[allow(clippy::unnecessary_wraps)]
fn default_global_requests_per_second() -> Option<u32> {
    Some(50)
}

fn default_retry_backoff() -> BackoffConfig {
    BackoffConfig {
        base_ms: 500,
        max_ms: 10_000,
        multiplier: default_multiplier(),
        jitter: default_jitter(),
    }
}

fn default_api_version() -> u8 {
    10
}

fn default_large_threshold() -> u16 {
    50
}

fn default_identify_interval_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_jitter_ms() -> u64 {
    1_000
}

fn default_max_missed_heartbeat_acks() -> u32 {
    2
}

fn default_malformed_event_threshold() -> u32 {
    10
}

fn default_reconnect_backoff() -> BackoffConfig {
    BackoffConfig {
        base_ms: 1_000,
        max_ms: 60_000,
        multiplier: default_multiplier(),
        jitter: default_jitter(),
    }
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.25
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `COURIER_TOKEN` is missing or a value cannot be parsed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let token = env::var("COURIER_TOKEN").map_err(|_| ConfigError::MissingVar("COURIER_TOKEN"))?;

        Ok(Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            http: HttpConfig {
                api_url: env::var("COURIER_API_URL").unwrap_or_else(|_| default_api_url()),
                token,
                request_timeout_ms: parse_var("REQUEST_TIMEOUT_MS")?
                    .unwrap_or_else(default_request_timeout_ms),
                max_retries: parse_var("REQUEST_MAX_RETRIES")?.unwrap_or_else(default_max_retries),
                max_rate_limit_retries: parse_var("RATE_LIMIT_MAX_RETRIES")?
                    .unwrap_or_else(default_max_rate_limit_retries),
                // 0 disables the local global ceiling
                global_requests_per_second: match parse_var::<u32>("GLOBAL_REQUESTS_PER_SECOND")? {
                    Some(0) => None,
                    Some(n) => Some(n),
                    None => default_global_requests_per_second(),
                },
                retry_backoff: BackoffConfig {
                    base_ms: parse_var("REQUEST_BACKOFF_BASE_MS")?
                        .unwrap_or(default_retry_backoff().base_ms),
                    max_ms: parse_var("REQUEST_BACKOFF_MAX_MS")?
                        .unwrap_or(default_retry_backoff().max_ms),
                    ..default_retry_backoff()
                },
            },
            gateway: GatewayConfig {
                url: env::var("GATEWAY_URL").ok(),
                api_version: parse_var("GATEWAY_API_VERSION")?.unwrap_or_else(default_api_version),
                intents: parse_var("GATEWAY_INTENTS")?.unwrap_or(0),
                large_threshold: parse_var("GATEWAY_LARGE_THRESHOLD")?
                    .unwrap_or_else(default_large_threshold),
                shard_count: parse_var("SHARD_COUNT")?,
                shard_range: env::var("SHARD_RANGE")
                    .ok()
                    .map(|s| {
                        parse_shard_range(&s)
                            .ok_or_else(|| ConfigError::InvalidValue("SHARD_RANGE", s.clone()))
                    })
                    .transpose()?,
                max_identify_concurrency: parse_var("MAX_IDENTIFY_CONCURRENCY")?,
                identify_interval_ms: parse_var("IDENTIFY_INTERVAL_MS")?
                    .unwrap_or_else(default_identify_interval_ms),
                connect_timeout_ms: parse_var("GATEWAY_CONNECT_TIMEOUT_MS")?
                    .unwrap_or_else(default_connect_timeout_ms),
                heartbeat_jitter_ms: parse_var("HEARTBEAT_JITTER_MS")?
                    .unwrap_or_else(default_heartbeat_jitter_ms),
                max_missed_heartbeat_acks: parse_var("MAX_MISSED_HEARTBEAT_ACKS")?
                    .unwrap_or_else(default_max_missed_heartbeat_acks),
                malformed_event_threshold: parse_var("MALFORMED_EVENT_THRESHOLD")?
                    .unwrap_or_else(default_malformed_event_threshold),
                reconnect_backoff: BackoffConfig {
                    base_ms: parse_var("RECONNECT_BACKOFF_BASE_MS")?
                        .unwrap_or(default_reconnect_backoff().base_ms),
                    max_ms: parse_var("RECONNECT_BACKOFF_MAX_MS")?
                        .unwrap_or(default_reconnect_backoff().max_ms),
                    ..default_reconnect_backoff()
                },
                resume_store_path: env::var("RESUME_STORE_PATH").ok(),
            },
        })
    }
}

/// Read and parse an optional environment variable
fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        Err(_) => Ok(None),
    }
}

/// Parse `"start..end"` (exclusive) or `"start-end"` (inclusive)
#[must_use]
pub fn parse_shard_range(raw: &str) -> Option<Range<u32>> {
    let raw = raw.trim();
    let range = if let Some((start, end)) = raw.split_once("..") {
        start.trim().parse().ok()?..end.trim().parse().ok()?
    } else if let Some((start, end)) = raw.split_once('-') {
        let end: u32 = end.trim().parse().ok()?;
        start.trim().parse().ok()?..end.checked_add(1)?
    } else {
        let single: u32 = raw.parse().ok()?;
        single..single.checked_add(1)?
    };

    (range.start < range.end).then_some(range)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
