//! Envelope routing.
//!
//! Maps each envelope kind to the handlers registered for it. Handlers run
//! synchronously on the dispatching task, in registration order; a failing or
//! panicking handler is logged and skipped without affecting the others.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{error, trace, warn};

use super::messages::Envelope;

/// A registered envelope handler.
pub type Handler<E> = Arc<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync>;

struct Registration<E> {
    id: u64,
    handler: Handler<E>,
}

struct RouterInner<E: Envelope> {
    next_id: u64,
    handlers: HashMap<E::Kind, Vec<Registration<E>>>,
}

impl<E: Envelope> RouterInner<E> {
    fn remove(&mut self, kind: E::Kind, id: u64) {
        if let Some(registrations) = self.handlers.get_mut(&kind) {
            registrations.retain(|r| r.id != id);
            if registrations.is_empty() {
                self.handlers.remove(&kind);
            }
        }
    }
}

/// Result of dispatching one envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Routes envelopes of one topic to handlers keyed by envelope kind.
pub struct EventRouter<E: Envelope> {
    inner: Arc<Mutex<RouterInner<E>>>,
}

impl<E: Envelope> Clone for EventRouter<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Envelope> Default for EventRouter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Envelope> fmt::Debug for EventRouter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("EventRouter")
            .field("kinds", &inner.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<E: Envelope> EventRouter<E> {
    /// Creates a router with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RouterInner {
                next_id: 0,
                handlers: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RouterInner<E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `handler` for envelopes of `kind`.
    ///
    /// The handler stays registered until the returned guard is unsubscribed
    /// or dropped.
    pub fn on<F>(&self, kind: E::Kind, handler: F) -> Subscription
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id = inner.next_id.wrapping_add(1);
            inner.handlers.entry(kind).or_default().push(Registration {
                id,
                handler: Arc::new(handler),
            });
            id
        };
        trace!(?kind, id, "handler registered");

        let weak: Weak<Mutex<RouterInner<E>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(kind, id);
                trace!(?kind, id, "handler removed");
            }
        })
    }

    /// Removes every handler registered for `kind`.
    pub fn off(&self, kind: E::Kind) {
        self.lock().handlers.remove(&kind);
    }

    /// Returns the number of handlers registered for `kind`.
    #[must_use]
    pub fn handler_count(&self, kind: E::Kind) -> usize {
        self.lock().handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Returns true if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().handlers.is_empty()
    }

    /// Delivers `envelope` to every handler registered for its kind.
    ///
    /// The handler list is snapshotted first, so handlers may register or
    /// unsubscribe from inside a call.
    pub fn dispatch(&self, envelope: &E) -> DispatchOutcome {
        let kind = envelope.kind();
        let handlers: Vec<Handler<E>> = self
            .lock()
            .handlers
            .get(&kind)
            .map(|registrations| {
                registrations
                    .iter()
                    .map(|r| Arc::clone(&r.handler))
                    .collect()
            })
            .unwrap_or_default();

        let mut outcome = DispatchOutcome::default();
        if handlers.is_empty() {
            trace!(?kind, "no handler for envelope, dropping");
            return outcome;
        }

        for handler in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(envelope))) {
                Ok(Ok(())) => outcome.delivered += 1,
                Ok(Err(e)) => {
                    outcome.failed += 1;
                    warn!(?kind, error = %e, "envelope handler failed");
                }
                Err(_) => {
                    outcome.failed += 1;
                    error!(?kind, "envelope handler panicked");
                }
            }
        }

        outcome
    }
}

/// Registration guard returned by [`EventRouter::on`].
///
/// Dropping the guard unsubscribes the handler.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Removes the handler. Calling this more than once has no effect.
    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Returns true while the handler is registered through this guard.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Leaves the handler registered for the lifetime of the router.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
