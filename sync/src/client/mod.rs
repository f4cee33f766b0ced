//! REST client for the store orders API.
//!
//! [`OrdersClient`] implements [`Backend`](crate::reconcile::Backend) so a
//! [`SyncedCollection`](crate::reconcile::SyncedCollection) of orders can be
//! driven end to end.
//!
//! # Example
//!
//! ```rust,ignore
//! use livedesk_sync::client::{ClientConfig, OrderFilters, OrdersClient};
//! use livedesk_sync::types::OrderAction;
//!
//! let client = OrdersClient::new(
//!     ClientConfig::new("https://api.example.com/api/v1").with_token(token),
//! )?;
//!
//! let orders = client.list_orders(&OrderFilters::store("pastita")).await?;
//! let channels = client.config().channel_config()?;
//! client.perform(&orders[0].id, &OrderAction::confirm()).await?;
//! ```

pub mod config;
pub mod error;
pub mod http;

pub use config::ClientConfig;
pub use error::ClientError;
pub use http::{OrderFilters, OrdersClient};
