//! Client configuration.
//!
//! A `ClientConfig` can be built in code or loaded from a TOML file:
//!
//! ```toml
//! name = "articles"
//! base_url = "https://example.com"
//! endpoint = "articles"
//! timeout_ms = 5000
//! token = "a35ff496e179"
//!
//! [dedupe]
//! policy = "drop"
//! min_delay_ms = 250
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MIN_DELAY_MS: u64 = 500;

/// What to do when the same request is issued again inside `min_delay_ms`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupePolicy {
    /// Every call reaches the transport.
    #[default]
    Off,
    /// Sleep until the window has passed, then send.
    Wait,
    /// Return a Duplicate envelope without a payload.
    Drop,
    /// Return a Duplicate envelope built from the previous response.
    Cached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupeConfig {
    pub policy: DedupePolicy,
    pub min_delay_ms: u64,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            policy: DedupePolicy::Off,
            min_delay_ms: DEFAULT_MIN_DELAY_MS,
        }
    }
}

impl DedupeConfig {
    pub fn new(policy: DedupePolicy, min_delay: Duration) -> Self {
        Self {
            policy,
            min_delay_ms: min_delay.as_millis() as u64,
        }
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Connection settings for one API endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Name used to tag log lines.
    pub name: String,
    pub base_url: String,
    /// Resource path under `/api/`, without slashes.
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub csrf_token: Option<String>,
    #[serde(default)]
    pub dedupe: DedupeConfig,
}

impl ClientConfig {
    pub fn new(name: &str, base_url: &str, endpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoint: endpoint.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            token: None,
            csrf_token: None,
            dedupe: DedupeConfig::default(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = if token.is_empty() { None } else { Some(token) };
        self
    }

    pub fn with_csrf_token(mut self, csrf_token: impl Into<String>) -> Self {
        self.csrf_token = Some(csrf_token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_dedupe(mut self, dedupe: DedupeConfig) -> Self {
        self.dedupe = dedupe;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: ClientConfig = toml::from_str(content)?;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Invalid(format!("base_url {:?}: {e}", self.base_url)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Invalid(format!(
                "base_url must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.endpoint.is_empty() {
            return Err(ConfigError::Invalid("endpoint is empty".to_string()));
        }
        if self.endpoint.starts_with('/') || self.endpoint.ends_with('/') {
            return Err(ConfigError::Invalid(format!(
                "endpoint {:?} must not start or end with '/'",
                self.endpoint
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}
