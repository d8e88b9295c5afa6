// telemetry-backends-rs/src/config.rs
// Connection settings for the concrete collaborators, read from the
// environment through config-rs.

use std::fmt;
use std::time::Duration;

use config_rs::{env_opt, env_or, get_client_address};

/// OpenSearch / Elasticsearch connection.
#[derive(Clone)]
pub struct LogStoreConfig {
    /// Base URL without a trailing slash.
    pub url: String,
    /// Index or index pattern searched, e.g. `logs-*`.
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Duration,
    pub fields: LogFieldMap,
}

/// Document field names used when building queries and reading hits.
#[derive(Debug, Clone)]
pub struct LogFieldMap {
    pub timestamp: String,
    pub message: String,
    pub level: String,
    pub namespace: String,
    pub pod: String,
    pub app: String,
    pub host: String,
    pub device: String,
    pub device_type: String,
}

impl Default for LogFieldMap {
    fn default() -> Self {
        Self {
            timestamp: "@timestamp".to_string(),
            message: "message".to_string(),
            level: "level".to_string(),
            namespace: "kubernetes.namespace_name".to_string(),
            pod: "kubernetes.pod_name".to_string(),
            app: "kubernetes.labels.app".to_string(),
            host: "host.name".to_string(),
            device: "device.name".to_string(),
            device_type: "device.type".to_string(),
        }
    }
}

impl LogStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: trim_url(url.into()),
            index: "logs-*".to_string(),
            username: None,
            password: None,
            request_timeout: Duration::from_secs(30),
            fields: LogFieldMap::default(),
        }
    }

    /// `LOG_STORE_URL`, else `LOG_STORE_SERVICE_ADDR` / `_PORT` (9200).
    pub fn from_env() -> Self {
        let url = env_opt("LOG_STORE_URL")
            .unwrap_or_else(|| get_client_address("LOG_STORE", 9200, None));
        Self {
            index: env_or("LOG_STORE_INDEX", "logs-*".to_string()),
            username: env_opt("LOG_STORE_USERNAME"),
            password: env_opt("LOG_STORE_PASSWORD"),
            request_timeout: Duration::from_millis(env_or("LOG_STORE_REQUEST_TIMEOUT_MS", 30_000u64)),
            ..Self::new(url)
        }
    }
}

/// Prometheus HTTP API connection.
#[derive(Debug, Clone)]
pub struct MetricsStoreConfig {
    pub url: String,
    /// Range used inside `rate()` expressions, e.g. `5m`.
    pub rate_window: String,
    pub request_timeout: Duration,
}

impl MetricsStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: trim_url(url.into()),
            rate_window: "5m".to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }

    /// `METRICS_STORE_URL`, else `METRICS_STORE_SERVICE_ADDR` / `_PORT` (9090).
    pub fn from_env() -> Self {
        let url = env_opt("METRICS_STORE_URL")
            .unwrap_or_else(|| get_client_address("METRICS_STORE", 9090, None));
        Self {
            rate_window: env_or("METRICS_STORE_RATE_WINDOW", "5m".to_string()),
            request_timeout: Duration::from_millis(env_or("METRICS_STORE_REQUEST_TIMEOUT_MS", 15_000u64)),
            ..Self::new(url)
        }
    }
}

/// OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub model: String,
    /// Sent as a bearer token when present. Local servers usually need none.
    pub api_key: Option<String>,
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            max_retries: 3,
            initial_retry_delay_ms: 500,
            max_retry_delay_ms: 5_000,
            temperature: 0.1,
            max_tokens: 1_000,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: env_or("LLM_API_URL", defaults.api_url),
            model: env_or("LLM_MODEL", defaults.model),
            api_key: env_opt("LLM_API_KEY"),
            max_retries: env_or("LLM_MAX_RETRIES", defaults.max_retries),
            initial_retry_delay_ms: env_or("LLM_INITIAL_RETRY_DELAY_MS", defaults.initial_retry_delay_ms),
            max_retry_delay_ms: env_or("LLM_MAX_RETRY_DELAY_MS", defaults.max_retry_delay_ms),
            temperature: env_or("LLM_TEMPERATURE", defaults.temperature),
            max_tokens: env_or("LLM_MAX_TOKENS", defaults.max_tokens),
            request_timeout: Duration::from_millis(env_or("LLM_REQUEST_TIMEOUT_MS", 60_000u64)),
        }
    }
}

fn trim_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Stand-in for a secret in `Debug` output.
fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

impl fmt::Debug for LogStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogStoreConfig")
            .field("url", &self.url)
            .field("index", &self.index)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("request_timeout", &self.request_timeout)
            .field("fields", &self.fields)
            .finish()
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("api_key", &redacted(&self.api_key))
            .field("max_retries", &self.max_retries)
            .field("initial_retry_delay_ms", &self.initial_retry_delay_ms)
            .field("max_retry_delay_ms", &self.max_retry_delay_ms)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
