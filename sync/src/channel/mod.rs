//! Real-time push channels.
//!
//! One [`ChannelConnection`] per topic keeps a WebSocket open, reconnecting
//! with capped exponential backoff, and hands every parsed envelope to its
//! [`EventRouter`].
//!
//! # Example
//!
//! ```rust,ignore
//! use livedesk_sync::channel::{ChannelConfig, ChannelConnection, Topic};
//! use livedesk_sync::events::{OrderEvent, OrderEventKind};
//!
//! let conn = ChannelConnection::<OrderEvent>::new(
//!     Topic::store_orders("pastita"),
//!     ChannelConfig::from_host("api.example.com", true),
//! )?;
//!
//! let _sub = conn.on(OrderEventKind::Created, |event| {
//!     println!("new order: {:?}", event);
//!     Ok(())
//! });
//!
//! conn.connect(token);
//! ```

pub mod backoff;
pub mod config;
pub mod connection;
pub mod error;
pub mod messages;
pub mod metrics;
pub mod router;
pub mod topic;

pub use backoff::{Backoff, ReconnectPolicy};
pub use config::ChannelConfig;
pub use connection::{ChannelConnection, ChannelState, ChannelStatus, Connectivity};
pub use error::ChannelError;
pub use messages::{parse_inbound, ClientMessage, ControlFrame, Envelope, Inbound};
pub use metrics::{ChannelMetrics, ChannelMetricsSnapshot};
pub use router::{DispatchOutcome, EventRouter, Handler, Subscription};
pub use topic::Topic;
