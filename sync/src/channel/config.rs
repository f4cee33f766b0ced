//! Channel configuration.
//!
//! Provides configuration options for push channel connections.

use std::time::Duration;

use reqwest::Url;

use super::backoff::ReconnectPolicy;
use super::error::ChannelError;
use super::topic::Topic;

/// Default WebSocket base URL.
pub const DEFAULT_BASE_URL: &str = "ws://localhost:8000";

/// Default keepalive interval in seconds.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 25;

/// Consecutive failed attempts after which a channel reports itself offline.
pub const DEFAULT_OFFLINE_AFTER_ATTEMPTS: u32 = 3;

/// Hosting domains that only serve TLS.
const TLS_ONLY_HOSTS: [&str; 2] = ["railway.app", "vercel.app"];

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Scheme and host, e.g. `wss://api.example.com`.
    pub base_url: String,

    /// Keepalive ping interval.
    pub heartbeat_interval: Duration,

    /// Reconnect timing.
    pub reconnect: ReconnectPolicy,

    /// Consecutive failures before connectivity is reported as offline.
    pub offline_after_attempts: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            reconnect: ReconnectPolicy::default(),
            offline_after_attempts: DEFAULT_OFFLINE_AFTER_ATTEMPTS,
        }
    }
}

impl ChannelConfig {
    /// Creates a new configuration with the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Derives the WebSocket base URL from a bare host.
    ///
    /// TLS is chosen when `secure` is set or the host belongs to a TLS-only
    /// hosting domain.
    #[must_use]
    pub fn from_host(host: &str, secure: bool) -> Self {
        let host = host.trim_end_matches('/');
        let secure = secure || TLS_ONLY_HOSTS.iter().any(|h| host.contains(h));
        let scheme = if secure { "wss" } else { "ws" };
        Self::new(format!("{}://{}", scheme, host))
    }

    /// Derives the WebSocket base URL from the REST API URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed or has no host.
    pub fn from_api_url(api_url: &str) -> Result<Self, ChannelError> {
        let url = Url::parse(api_url)
            .map_err(|e| ChannelError::InvalidConfig(format!("invalid api url: {}", e)))?;

        let host = url
            .host_str()
            .ok_or_else(|| ChannelError::InvalidConfig("api url has no host".to_string()))?;

        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self::from_host(&host, url.scheme() == "https"))
    }

    /// Sets the keepalive interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the reconnect policy.
    #[must_use]
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Sets the offline threshold.
    #[must_use]
    pub fn with_offline_after_attempts(mut self, attempts: u32) -> Self {
        self.offline_after_attempts = attempts;
        self
    }

    /// Builds the endpoint URL for a topic.
    ///
    /// The token travels as a query parameter because browsers cannot set
    /// headers on the WebSocket handshake and the backend expects it there.
    #[must_use]
    pub fn connection_url(&self, topic: &Topic, token: &str) -> String {
        format!(
            "{}/ws/{}/?token={}",
            self.base_url.trim_end_matches('/'),
            topic.path(),
            token
        )
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.base_url.is_empty() {
            return Err(ChannelError::InvalidConfig(
                "base_url cannot be empty".to_string(),
            ));
        }

        if !self.base_url.starts_with("ws://") && !self.base_url.starts_with("wss://") {
            return Err(ChannelError::InvalidConfig(
                "base_url must start with ws:// or wss://".to_string(),
            ));
        }

        if self.heartbeat_interval.is_zero() {
            return Err(ChannelError::InvalidConfig(
                "heartbeat_interval must be > 0".to_string(),
            ));
        }

        self.reconnect.validate()
    }
}
