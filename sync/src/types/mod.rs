//! Domain types for the Livedesk dashboard.

pub mod order;

pub use order::{BoardColumn, Order, OrderAction, OrderPatch, OrderStatus};
