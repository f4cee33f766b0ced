//! Livedesk sync - real-time channel and reconciliation core.
//!
//! Keeps the push feeds of the Livedesk dashboard (orders, chat, automation)
//! flowing to consumers and merges optimistic local edits with refreshed
//! server state.
//!
//! # Components
//!
//! - [`ChannelConnection`]: one self-healing WebSocket per topic
//! - [`EventRouter`]: per-topic dispatch of typed envelopes to handlers
//! - [`ChannelRegistry`]: shares one connection per topic across consumers
//! - [`OptimisticReconciler`]: authoritative records plus local overrides
//! - [`SyncedCollection`]: a reconciler driven by a [`Backend`]
//! - [`OrdersClient`]: the REST backend for store orders
//!
//! # Example
//!
//! ```rust,ignore
//! use livedesk_sync::{
//!     ChannelConfig, ChannelRegistry, ClientConfig, OrderFilters, OrdersClient,
//!     SyncedCollection, Topic,
//! };
//! use livedesk_sync::events::{OrderEvent, OrderEventKind};
//!
//! let registry = ChannelRegistry::<OrderEvent>::new(ChannelConfig::from_api_url(api_url)?)?;
//! let lease = registry.acquire(Topic::store_orders("pastita"), &token)?;
//!
//! let client = OrdersClient::new(ClientConfig::new(api_url).with_token(&token))?;
//! let orders = SyncedCollection::new(client, OrderFilters::store("pastita"));
//! let _subs = orders.refresh_on(lease.router(), &OrderEventKind::CHANGES);
//! orders.spawn_refresher();
//! orders.refresh().await?;
//! ```

pub mod channel;
pub mod client;
pub mod error;
pub mod events;
pub mod reconcile;
pub mod registry;
pub mod types;

pub use channel::{
    ChannelConfig, ChannelConnection, ChannelError, ChannelState, ChannelStatus, ClientMessage,
    Connectivity, Envelope, EventRouter, ReconnectPolicy, Subscription, Topic,
};
pub use client::{ClientConfig, ClientError, OrderFilters, OrdersClient};
pub use error::SyncError;
pub use reconcile::{
    Backend, Entity, MutationError, MutationTicket, OptimisticReconciler, SyncedCollection,
};
pub use registry::{ChannelLease, ChannelRegistry};
pub use types::{BoardColumn, Order, OrderAction, OrderPatch, OrderStatus};
