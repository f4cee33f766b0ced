//! HTTP client implementation.
//!
//! Provides the REST client for the store orders API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, warn};

use super::config::{ClientConfig, USER_AGENT};
use super::error::ClientError;
use crate::reconcile::Backend;
use crate::types::{Order, OrderAction, OrderStatus};

/// First delay of the timeout backoff.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Ceiling of the timeout backoff.
const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// API error body.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Paginated list response.
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    next: Option<String>,
    results: Vec<T>,
}

/// List endpoints answer either with a page or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Paged(Page<T>),
    Plain(Vec<T>),
}

/// Query parameters for listing orders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilters {
    /// Store slug or ID.
    pub store: Option<String>,
    /// Only orders in this status.
    pub status: Option<OrderStatus>,
}

impl OrderFilters {
    /// Filters for one store.
    #[must_use]
    pub fn store(store: impl Into<String>) -> Self {
        Self {
            store: Some(store.into()),
            status: None,
        }
    }

    /// Restricts to one status.
    #[must_use]
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(ref store) = self.store {
            query.push(("store", store.clone()));
        }
        if let Some(status) = self.status {
            query.push(("status", status.to_string()));
        }
        query
    }
}

/// Delay before timeout retry number `retry_count` (1-based): doubles from
/// [`RETRY_BASE_DELAY`] up to [`RETRY_MAX_DELAY`].
fn retry_delay(retry_count: u32) -> Duration {
    RETRY_BASE_DELAY
        .saturating_mul(2u32.saturating_pow(retry_count))
        .min(RETRY_MAX_DELAY)
}

/// HTTP client for the store orders API.
#[derive(Debug, Clone)]
pub struct OrdersClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl OrdersClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(ref token) = config.token {
            let value = HeaderValue::from_str(&format!("Token {}", token))
                .map_err(|_| ClientError::InvalidConfig("token is not a valid header value".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ClientError::Request)?;

        Ok(Self { config, http })
    }

    /// Creates a client for the API at `api_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_api_url(api_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::new(ClientConfig::new(api_url))
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends a request, retrying rate limits and, for idempotent requests,
    /// timeouts.
    async fn request_with_retry<T, F>(&self, request_fn: F, idempotent: bool) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut retry_count = 0;

        loop {
            match request_fn().send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        let body = resp
                            .text()
                            .await
                            .map_err(|e| ClientError::Deserialization(e.to_string()))?;

                        return serde_json::from_str(&body)
                            .map_err(|e| ClientError::Deserialization(e.to_string()));
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = resp
                            .headers()
                            .get("Retry-After")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse().ok());

                        if retry_count < self.config.max_retries {
                            let wait_time = retry_after.unwrap_or(1);
                            debug!(wait_time, "rate limited, retrying");
                            tokio::time::sleep(Duration::from_secs(wait_time)).await;
                            retry_count += 1;
                            continue;
                        }

                        return Err(ClientError::RateLimited { retry_after });
                    }

                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(ClientError::NotFound(resp.url().path().to_string()));
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED
                        || status == reqwest::StatusCode::FORBIDDEN
                    {
                        return Err(ClientError::Unauthorized);
                    }

                    let body = resp.text().await.unwrap_or_default();
                    let message = serde_json::from_str::<ApiErrorBody>(&body)
                        .ok()
                        .and_then(|e| e.detail.or(e.error))
                        .unwrap_or(body);

                    return Err(ClientError::Api {
                        status: status.as_u16(),
                        message,
                    });
                }
                Err(e) => {
                    if idempotent && e.is_timeout() && retry_count < self.config.max_retries {
                        retry_count += 1;
                        warn!(retry_count, "request timed out, retrying");
                        tokio::time::sleep(retry_delay(retry_count)).await;
                        continue;
                    }
                    return Err(ClientError::from(e));
                }
            }
        }
    }

    /// Lists orders matching `filters`, following pagination.
    ///
    /// The result is complete or an error; a listing longer than
    /// `max_pages` fails with [`ClientError::Truncated`].
    ///
    /// # Errors
    ///
    /// Returns an error if any page request fails or the page bound is hit.
    pub async fn list_orders(&self, filters: &OrderFilters) -> Result<Vec<Order>, ClientError> {
        let query = filters.query();
        let first = self.config.orders_url();
        let listing: Listing<Order> = self
            .request_with_retry(|| self.http.get(&first).query(&query), true)
            .await?;

        let mut page = match listing {
            Listing::Plain(orders) => return Ok(orders),
            Listing::Paged(page) => page,
        };
        let mut orders = std::mem::take(&mut page.results);
        let mut pages = 1;

        while let Some(next) = page.next.take() {
            if pages >= self.config.max_pages {
                warn!(pages, fetched = orders.len(), "order listing exceeds page limit");
                return Err(ClientError::Truncated { pages });
            }
            page = self
                .request_with_retry(|| self.http.get(&next), true)
                .await?;
            orders.append(&mut page.results);
            pages += 1;
        }

        debug!(pages, count = orders.len(), "orders listed");
        Ok(orders)
    }

    /// Gets one order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the order does not exist.
    pub async fn get_order(&self, id: &str) -> Result<Order, ClientError> {
        let url = self.config.order_url(id, None);
        self.request_with_retry(|| self.http.get(&url), true).await
    }

    /// Performs `action` on order `id` and returns the updated order.
    ///
    /// Only rate-limit responses are retried.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects the action.
    pub async fn perform(&self, id: &str, action: &OrderAction) -> Result<Order, ClientError> {
        let url = self.config.order_url(id, Some(action.endpoint()));
        let body = action.body();
        debug!(order_id = id, %action, "posting order action");
        self.request_with_retry(|| self.http.post(&url).json(&body), false)
            .await
    }
}

#[async_trait]
impl Backend for OrdersClient {
    type Entity = Order;
    type Action = OrderAction;
    type Filters = OrderFilters;
    type Error = ClientError;

    async fn fetch_collection(&self, filters: &OrderFilters) -> Result<Vec<Order>, ClientError> {
        self.list_orders(filters).await
    }

    async fn mutate(&self, id: &String, action: &OrderAction) -> Result<Order, ClientError> {
        self.perform(id, action).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_new() {
        let client = OrdersClient::new(ClientConfig::new("https://api.example.com/api/v1"));
        assert!(client.is_ok());
    }

    #[test]
    fn test_client_with_token() {
        let config = ClientConfig::new("https://api.example.com").with_token("abc123");
        let client = OrdersClient::new(config).expect("client creation");
        assert_eq!(client.config().token, Some("abc123".to_string()));
    }

    #[test]
    fn test_client_invalid_token() {
        let config = ClientConfig::new("https://api.example.com").with_token("bad\ntoken");
        assert!(matches!(
            OrdersClient::new(config),
            Err(ClientError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_client_invalid_config() {
        assert!(OrdersClient::with_api_url("").is_err());
    }

    #[test]
    fn test_filters_query() {
        let filters = OrderFilters::store("pastita").with_status(OrderStatus::Ready);
        assert_eq!(
            filters.query(),
            vec![("store", "pastita".to_string()), ("status", "ready".to_string())]
        );
        assert!(OrderFilters::default().query().is_empty());
    }

    #[test]
    fn test_listing_shapes() {
        let paged: Listing<u32> =
            serde_json::from_str(r#"{"count":2,"next":null,"previous":null,"results":[1,2]}"#)
                .expect("paged");
        assert!(matches!(paged, Listing::Paged(Page { next: None, .. })));

        let plain: Listing<u32> = serde_json::from_str("[1,2,3]").expect("plain");
        assert!(matches!(plain, Listing::Plain(ref v) if v.len() == 3));
    }

    #[test]
    fn test_retry_delay_doubles_and_saturates() {
        assert_eq!(retry_delay(1), Duration::from_millis(200));
        assert_eq!(retry_delay(3), Duration::from_millis(800));
        assert_eq!(retry_delay(7), RETRY_MAX_DELAY);
        assert_eq!(retry_delay(40), RETRY_MAX_DELAY);
        assert_eq!(retry_delay(u32::MAX), RETRY_MAX_DELAY);
    }

    #[test]
    fn test_error_body() {
        let body: ApiErrorBody =
            serde_json::from_str(r#"{"detail":"Invalid status transition"}"#).expect("body");
        assert_eq!(body.detail.as_deref(), Some("Invalid status transition"));
        assert!(body.error.is_none());
    }
}
