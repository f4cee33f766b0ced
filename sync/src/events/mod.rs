//! Typed envelopes for each push topic.

pub mod automation;
pub mod chat;
mod lenient;
pub mod orders;

pub use automation::{AutomationEvent, AutomationEventKind, AutomationPayload};
pub use chat::{ChatEvent, ChatEventKind};
pub use orders::{OrderEvent, OrderEventKind, OrderNotice};
