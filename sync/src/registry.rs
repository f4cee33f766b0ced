//! Shared channel registry.
//!
//! Keeps one [`ChannelConnection`] per topic no matter how many consumers
//! want it. Each consumer holds a [`ChannelLease`]; the connection is created
//! on the first lease and disconnected when the last one is released.
//!
//! A registry is typed by its envelope, so sharing only happens between
//! consumers of the same registry. Two registries acquiring the same topic
//! open two transports; keep one registry per topic in the process.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::channel::connection::TransportGate;
use crate::channel::{
    ChannelConfig, ChannelConnection, ChannelError, ChannelMetrics, ChannelState, ChannelStatus,
    ClientMessage, Envelope, EventRouter, Subscription, Topic,
};

struct Entry<E: Envelope> {
    connection: Arc<ChannelConnection<E>>,
    refs: usize,
}

type Entries<E> = Mutex<HashMap<Topic, Entry<E>>>;

/// Gates outlive their connection while the old driver is still closing.
type Gates = Mutex<HashMap<Topic, Weak<TransportGate>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reference-counted connections keyed by topic.
///
/// One registry serves one envelope type. Consumers of the same topic must
/// share the registry instance (or a clone of it) to share the transport.
pub struct ChannelRegistry<E: Envelope> {
    config: ChannelConfig,
    entries: Arc<Entries<E>>,
    gates: Arc<Gates>,
}

impl<E: Envelope> Clone for ChannelRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            entries: Arc::clone(&self.entries),
            gates: Arc::clone(&self.gates),
        }
    }
}

impl<E: Envelope> fmt::Debug for ChannelRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("base_url", &self.config.base_url)
            .field("topics", &self.active_topics())
            .finish()
    }
}

impl<E: Envelope> ChannelRegistry<E> {
    /// Creates an empty registry whose connections use `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ChannelConfig) -> Result<Self, ChannelError> {
        config.validate()?;
        Ok(Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
            gates: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Returns the connection configuration.
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Acquires the connection for `topic`, connecting it on first use.
    ///
    /// A reused connection keeps the token it was opened with, unless it was
    /// found closed, in which case it is reconnected with `token`. Must be
    /// called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic is empty.
    pub fn acquire(&self, topic: Topic, token: &str) -> Result<ChannelLease<E>, ChannelError> {
        let mut entries = lock(&self.entries);

        let connection = if let Some(entry) = entries.get_mut(&topic) {
            entry.refs += 1;
            debug!(%topic, refs = entry.refs, "reusing channel");
            if entry.connection.state() == ChannelState::Closed {
                warn!(%topic, "shared channel was closed, reconnecting");
                entry.connection.connect(token);
            }
            Arc::clone(&entry.connection)
        } else {
            let connection = Arc::new(ChannelConnection::with_gate(
                topic.clone(),
                self.config.clone(),
                self.gate(&topic),
            )?);
            connection.connect(token);
            entries.insert(
                topic.clone(),
                Entry {
                    connection: Arc::clone(&connection),
                    refs: 1,
                },
            );
            info!(%topic, "channel acquired");
            connection
        };

        Ok(ChannelLease {
            topic,
            connection,
            entries: Arc::downgrade(&self.entries),
            released: false,
        })
    }

    /// Returns the transport gate for `topic`, shared with any driver of a
    /// released connection that is still closing.
    fn gate(&self, topic: &Topic) -> Arc<TransportGate> {
        let mut gates = lock(&self.gates);
        gates.retain(|_, gate| gate.strong_count() > 0);
        if let Some(gate) = gates.get(topic).and_then(Weak::upgrade) {
            return gate;
        }
        let gate = Arc::new(TransportGate::new(()));
        gates.insert(topic.clone(), Arc::downgrade(&gate));
        gate
    }

    /// Returns the number of live leases for `topic`.
    #[must_use]
    pub fn ref_count(&self, topic: &Topic) -> usize {
        lock(&self.entries).get(topic).map_or(0, |entry| entry.refs)
    }

    /// Returns the topics with a live connection, sorted.
    #[must_use]
    pub fn active_topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = lock(&self.entries).keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Returns the number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Returns true if no connection is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

/// A consumer's hold on a shared connection.
///
/// Exposes what a consumer may do on a shared connection. Closing it is
/// left to the registry; dropping the lease releases it.
pub struct ChannelLease<E: Envelope> {
    topic: Topic,
    connection: Arc<ChannelConnection<E>>,
    entries: Weak<Entries<E>>,
    released: bool,
}

impl<E: Envelope> ChannelLease<E> {
    /// Returns the leased topic.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Returns the router that receives the topic's envelopes.
    #[must_use]
    pub fn router(&self) -> &EventRouter<E> {
        self.connection.router()
    }

    /// Registers a handler on the shared router.
    pub fn on<F>(&self, kind: E::Kind, handler: F) -> Subscription
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.connection.on(kind, handler)
    }

    /// Sends `message` if the session is open.
    pub fn send(&self, message: &ClientMessage) -> bool {
        self.connection.send(message)
    }

    /// Scopes the shared feed to `company_id`.
    pub fn subscribe_company(&self, company_id: impl Into<String>) -> bool {
        self.connection.subscribe_company(company_id)
    }

    /// Drops the `company_id` scope.
    pub fn unsubscribe_company(&self, company_id: &str) -> bool {
        self.connection.unsubscribe_company(company_id)
    }

    /// Subscribes to status changes.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ChannelStatus> {
        self.connection.status()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.connection.state()
    }

    /// Returns true while a session is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    /// Returns the connection metrics.
    #[must_use]
    pub fn metrics(&self) -> Arc<ChannelMetrics> {
        self.connection.metrics()
    }

    /// Cuts a pending backoff delay short.
    pub fn reconnect_now(&self) -> bool {
        self.connection.reconnect_now()
    }

    /// Releases the lease now.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let Some(entries) = self.entries.upgrade() else {
            return;
        };

        let last = {
            let mut entries = lock(&entries);
            match entries.get_mut(&self.topic) {
                Some(entry) if Arc::ptr_eq(&entry.connection, &self.connection) => {
                    entry.refs = entry.refs.saturating_sub(1);
                    if entry.refs == 0 {
                        entries.remove(&self.topic)
                    } else {
                        debug!(topic = %self.topic, refs = entry.refs, "channel released");
                        None
                    }
                }
                _ => None,
            }
        };

        if let Some(entry) = last {
            entry.connection.disconnect();
            info!(topic = %self.topic, "last lease released, channel closed");
        }
    }
}

impl<E: Envelope> Drop for ChannelLease<E> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl<E: Envelope> fmt::Debug for ChannelLease<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelLease")
            .field("topic", &self.topic)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelState;
    use crate::events::{ChatEvent, OrderEvent};

    fn registry() -> ChannelRegistry<OrderEvent> {
        ChannelRegistry::new(ChannelConfig::new("ws://127.0.0.1:9")).expect("registry")
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = ChannelRegistry::<ChatEvent>::new(ChannelConfig::new(""));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_acquire_reuses_connection() {
        let registry = registry();
        let topic = Topic::store_orders("pastita");

        let first = registry.acquire(topic.clone(), "t1").expect("acquire");
        let second = registry.acquire(topic.clone(), "t2").expect("acquire");

        assert!(Arc::ptr_eq(&first.connection, &second.connection));
        assert_eq!(registry.ref_count(&topic), 2);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_release_to_zero_disconnects() {
        let registry = registry();
        let topic = Topic::store_orders("pastita");

        let first = registry.acquire(topic.clone(), "t").expect("acquire");
        let second = registry.acquire(topic.clone(), "t").expect("acquire");
        let connection = Arc::clone(&first.connection);

        first.release();
        assert_eq!(registry.ref_count(&topic), 1);
        assert_ne!(connection.state(), ChannelState::Closed);

        drop(second);
        assert_eq!(registry.ref_count(&topic), 0);
        assert!(registry.is_empty());
        assert_eq!(connection.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn test_reacquire_after_release_creates_new_connection() {
        let registry = registry();
        let topic = Topic::store_orders("pastita");

        let first = registry.acquire(topic.clone(), "t").expect("acquire");
        let old = Arc::clone(&first.connection);
        drop(first);

        let second = registry.acquire(topic.clone(), "t").expect("acquire");
        assert!(!Arc::ptr_eq(&old, &second.connection));
        assert_eq!(registry.ref_count(&topic), 1);
    }

    #[tokio::test]
    async fn test_active_topics_sorted() {
        let registry = registry();
        let _b = registry.acquire(Topic::store_orders("b"), "t").expect("acquire");
        let _a = registry.acquire(Topic::store_orders("a"), "t").expect("acquire");

        assert_eq!(
            registry.active_topics(),
            vec![Topic::store_orders("a"), Topic::store_orders("b")]
        );
    }

    #[tokio::test]
    async fn test_acquire_empty_topic_fails() {
        let registry = registry();
        assert!(registry.acquire(Topic::new(""), "t").is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_lease_outlives_registry() {
        let registry = registry();
        let lease = registry.acquire(Topic::automation(), "t").expect("acquire");
        let connection = Arc::clone(&lease.connection);
        drop(registry);
        drop(lease);
        assert_ne!(connection.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn test_acquire_reconnects_closed_entry() {
        let registry = registry();
        let topic = Topic::store_orders("pastita");

        let first = registry.acquire(topic.clone(), "t").expect("acquire");
        first.connection.disconnect();
        assert_eq!(first.state(), ChannelState::Closed);

        let second = registry.acquire(topic.clone(), "t").expect("acquire");
        assert!(Arc::ptr_eq(&first.connection, &second.connection));
        assert_ne!(second.state(), ChannelState::Closed);
        assert_eq!(registry.ref_count(&topic), 2);
    }

    #[tokio::test]
    async fn test_reacquire_shares_transport_gate() {
        let registry = registry();
        let topic = Topic::store_orders("pastita");

        let first = registry.acquire(topic.clone(), "t").expect("acquire");
        let held = registry.gate(&topic);
        drop(first);

        let _second = registry.acquire(topic.clone(), "t").expect("acquire");
        assert!(Arc::ptr_eq(&held, &registry.gate(&topic)));

        drop(held);
        let _other = registry.acquire(Topic::store_orders("other"), "t").expect("acquire");
        assert_eq!(lock(&registry.gates).len(), 2);
    }

    #[tokio::test]
    async fn test_separate_registries_do_not_share() {
        let topic = Topic::store_orders("pastita");
        let left = registry();
        let right = registry();

        let a = left.acquire(topic.clone(), "t").expect("acquire");
        let b = right.acquire(topic.clone(), "t").expect("acquire");

        assert!(!Arc::ptr_eq(&a.connection, &b.connection));
        assert_eq!(left.ref_count(&topic), 1);
        assert_eq!(right.ref_count(&topic), 1);
    }
}
