//! Optimistic reconciliation of server-owned collections.

pub mod collection;
pub mod entity;
pub mod reconciler;

pub use collection::{Backend, MutationError, SyncedCollection};
pub use entity::Entity;
pub use reconciler::{MutationTicket, OptimisticReconciler};
