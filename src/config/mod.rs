use crate::client::{
    ApiClient, AuthConfig, BackoffPolicy, DEFAULT_CHAT_PATH, ReqwestTransport,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const BASE_URL_ENV: &str = "SOUS_BASE_URL";
pub const API_TOKEN_ENV: &str = "SOUS_API_TOKEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend root, e.g. `http://localhost:3000`.
    pub base_url: String,
    /// Sent as a bearer token when set.
    pub api_token: Option<String>,
    pub chat_path: String,
    /// Timeout for buffered requests. Streams are not bounded.
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            api_token: None,
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            request_timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub retry_limit: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            retry_limit: policy.retry_limit(),
            base_delay_ms: u64::try_from(policy.base_delay().as_millis()).unwrap_or(u64::MAX),
            max_delay_ms: u64::try_from(policy.max_delay().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.retry_limit,
        )
    }
}

impl Config {
    /// `<config dir>/sous/config.toml`, or `.sous/config.toml` when there is no config dir.
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("sous").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".sous/config.toml"))
    }

    /// Load the config file (if any) and apply environment overrides.
    ///
    /// Not validated: callers apply their own overrides first, then call
    /// [`validate`](Self::validate).
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::path())?;
        config.apply_overrides(
            std::env::var(BASE_URL_ENV).ok(),
            std::env::var(API_TOKEN_ENV).ok(),
        );
        Ok(config)
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, base_url: Option<String>, api_token: Option<String>) {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(token) = api_token.filter(|t| !t.trim().is_empty()) {
            self.api_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "base_url must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        // Zero would time out every buffered request before it is sent.
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be at least 1".into()));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(Error::Config(
                "retry.max_delay_ms must not be smaller than retry.base_delay_ms".into(),
            ));
        }
        Ok(())
    }

    /// Build an API client for this configuration.
    pub fn client(&self) -> ApiClient {
        let auth = self.api_token.clone().map(AuthConfig::Bearer);
        let transport = ReqwestTransport::new(&self.base_url, auth)
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs));
        ApiClient::new(Arc::new(transport))
            .with_policy(self.retry.policy())
            .with_chat_path(&self.chat_path)
    }
}
