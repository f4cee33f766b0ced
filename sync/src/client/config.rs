//! Orders API configuration.
//!
//! The REST base URL also locates the push server, so one [`ClientConfig`]
//! yields both the order endpoints and the [`ChannelConfig`] for the store's
//! topics.

use std::time::Duration;

use reqwest::Url;

use super::error::ClientError;
use crate::channel::{ChannelConfig, ChannelError};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default retries for rate limits and idempotent timeouts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Highest accepted `max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Default bound on pages followed by one listing.
pub const DEFAULT_MAX_PAGES: usize = 50;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("livedesk-sync/", env!("CARGO_PKG_VERSION"));

/// Orders API configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// REST base URL without a trailing slash, e.g. `https://host/api/v1`.
    pub api_url: String,

    /// Auth token, sent as `Authorization: Token <token>`.
    pub token: Option<String>,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Retries for rate limits and idempotent timeouts.
    pub max_retries: u32,

    /// Pages a listing may follow before it is rejected as incomplete.
    pub max_pages: usize,
}

impl ClientConfig {
    /// Creates a configuration for the API at `api_url`.
    #[must_use]
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Sets the auth token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the page bound for listings.
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Returns the order collection endpoint.
    #[must_use]
    pub fn orders_url(&self) -> String {
        format!("{}/stores/orders/", self.api_url)
    }

    /// Returns the endpoint of one order, or of an action on it.
    #[must_use]
    pub fn order_url(&self, id: &str, action: Option<&str>) -> String {
        match action {
            Some(action) => format!("{}/stores/orders/{}/{}/", self.api_url, id, action),
            None => format!("{}/stores/orders/{}/", self.api_url, id),
        }
    }

    /// Derives the push channel configuration from the API host.
    ///
    /// # Errors
    ///
    /// Returns an error if the API URL has no host.
    pub fn channel_config(&self) -> Result<ChannelConfig, ChannelError> {
        ChannelConfig::from_api_url(&self.api_url)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ClientError> {
        let url = Url::parse(&self.api_url)
            .map_err(|e| ClientError::InvalidConfig(format!("invalid api url: {}", e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ClientError::InvalidConfig(
                "api url must start with http:// or https://".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }

        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ClientError::InvalidConfig(format!(
                "max_retries must be at most {}",
                MAX_RETRIES_LIMIT
            )));
        }

        if self.max_pages == 0 {
            return Err(ClientError::InvalidConfig(
                "max_pages must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_order_endpoints() {
        let config = ClientConfig::new("https://api.example.com/api/v1/");
        assert_eq!(config.api_url, "https://api.example.com/api/v1");
        assert_eq!(config.orders_url(), "https://api.example.com/api/v1/stores/orders/");
        assert_eq!(
            config.order_url("o-1", None),
            "https://api.example.com/api/v1/stores/orders/o-1/"
        );
        assert_eq!(
            config.order_url("o-1", Some("mark_paid")),
            "https://api.example.com/api/v1/stores/orders/o-1/mark_paid/"
        );
    }

    #[test]
    fn test_channel_config_follows_api_host() {
        let secure = ClientConfig::new("https://api.example.com/api/v1");
        assert_eq!(
            secure.channel_config().expect("channel").base_url,
            "wss://api.example.com"
        );

        let local = ClientConfig::new("http://localhost:8000/api/v1");
        assert_eq!(
            local.channel_config().expect("channel").base_url,
            "ws://localhost:8000"
        );
    }

    #[test]
    fn test_validate() {
        assert_ok!(ClientConfig::new("http://localhost:8000/api/v1").validate());
        assert_err!(ClientConfig::new("").validate());
        assert_err!(ClientConfig::new("ftp://api.example.com").validate());
        assert_err!(ClientConfig::new("https://api.example.com")
            .with_timeout(Duration::ZERO)
            .validate());
        assert_err!(ClientConfig::new("https://api.example.com")
            .with_max_pages(0)
            .validate());
    }

    #[test]
    fn test_validate_bounds_retries() {
        let config = ClientConfig::new("https://api.example.com");
        assert_ok!(config.clone().with_max_retries(MAX_RETRIES_LIMIT).validate());
        assert!(matches!(
            config.with_max_retries(MAX_RETRIES_LIMIT + 1).validate(),
            Err(ClientError::InvalidConfig(_))
        ));
    }
}
