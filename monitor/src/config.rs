//! Monitor configuration.
//!
//! Loaded from `LIVEDESK_*` environment variables.

use std::env;
use std::time::Duration;

use livedesk_sync::channel::config::DEFAULT_HEARTBEAT_SECS;
use livedesk_sync::{ChannelConfig, ClientConfig};
use serde::{Deserialize, Serialize};

/// REST API base URL, e.g. `http://localhost:8000/api/v1`.
pub const ENV_API_URL: &str = "LIVEDESK_API_URL";
/// WebSocket host, e.g. `api.example.com` or `localhost:8000`.
pub const ENV_WS_HOST: &str = "LIVEDESK_WS_HOST";
/// Auth token for both REST and WebSocket.
pub const ENV_TOKEN: &str = "LIVEDESK_TOKEN";
/// Store whose board is monitored.
pub const ENV_STORE_SLUG: &str = "LIVEDESK_STORE_SLUG";
/// Company scope for the automation feed.
pub const ENV_COMPANY_ID: &str = "LIVEDESK_COMPANY_ID";

/// Configuration for the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// REST API base URL.
    pub api_url: String,

    /// WebSocket host; derived from `api_url` when absent.
    #[serde(default)]
    pub ws_host: Option<String>,

    /// Auth token.
    pub token: String,

    /// Store slug.
    pub store_slug: String,

    /// Company to scope the automation feed to.
    #[serde(default)]
    pub company_id: Option<String>,

    /// Seconds between keepalive pings.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

const fn default_heartbeat_secs() -> u64 {
    DEFAULT_HEARTBEAT_SECS
}

impl MonitorConfig {
    /// Creates a configuration with the required fields.
    #[must_use]
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
        store_slug: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            ws_host: None,
            token: token.into(),
            store_slug: store_slug.into(),
            company_id: None,
            heartbeat_secs: default_heartbeat_secs(),
        }
    }

    /// Sets the WebSocket host.
    #[must_use]
    pub fn with_ws_host(mut self, host: impl Into<String>) -> Self {
        self.ws_host = Some(host.into());
        self
    }

    /// Sets the company scope.
    #[must_use]
    pub fn with_company_id(mut self, company_id: impl Into<String>) -> Self {
        self.company_id = Some(company_id.into());
        self
    }

    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or the result is
    /// invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads the configuration through `lookup`. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or the result is
    /// invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let config = Self {
            api_url: require(ENV_API_URL)?,
            ws_host: get(ENV_WS_HOST),
            token: require(ENV_TOKEN)?,
            store_slug: require(ENV_STORE_SLUG)?,
            company_id: get(ENV_COMPANY_ID),
            heartbeat_secs: default_heartbeat_secs(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(ConfigError::InvalidApiUrl(self.api_url.clone()));
        }

        if self.token.is_empty() {
            return Err(ConfigError::Missing(ENV_TOKEN));
        }

        if self.store_slug.is_empty() || self.store_slug.contains('/') {
            return Err(ConfigError::InvalidStoreSlug(self.store_slug.clone()));
        }

        if self.heartbeat_secs == 0 {
            return Err(ConfigError::InvalidHeartbeat);
        }

        Ok(())
    }

    /// Builds the REST client configuration.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.api_url).with_token(&self.token)
    }

    /// Builds the channel configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no WebSocket host is set and none can be derived
    /// from the API URL.
    pub fn channel_config(&self) -> Result<ChannelConfig, ConfigError> {
        let config = match self.ws_host {
            Some(ref host) => ChannelConfig::from_host(host, self.api_url.starts_with("https://")),
            None => self
                .client_config()
                .channel_config()
                .map_err(|_| ConfigError::InvalidApiUrl(self.api_url.clone()))?,
        };
        Ok(config.with_heartbeat_interval(Duration::from_secs(self.heartbeat_secs)))
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required variable not set.
    #[error("{0} is not set")]
    Missing(&'static str),

    /// API URL is not an http(s) URL.
    #[error("invalid api url: {0}")]
    InvalidApiUrl(String),

    /// Store slug is empty or contains a path separator.
    #[error("invalid store slug: {0:?}")]
    InvalidStoreSlug(String),

    /// Heartbeat interval is zero.
    #[error("heartbeat_secs must be > 0")]
    InvalidHeartbeat,
}
