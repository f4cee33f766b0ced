//! Livedesk Monitor - headless order board monitor.
//!
//! Connects to a store's orders topic, keeps a reconciled order board and
//! logs board and connectivity changes. With a company configured it also
//! follows the automation feed.
//!
//! # Components
//!
//! - [`config`]: Monitor configuration
//! - [`board`]: Board summaries and diffs
//! - [`service`]: Main monitor service

pub mod board;
pub mod config;
pub mod service;

pub use board::{BoardSummary, ColumnChange, OrderMove};
pub use config::{ConfigError, MonitorConfig};
pub use service::{MonitorError, MonitorService};
