//! Persistent channel connection.
//!
//! A [`ChannelConnection`] owns one WebSocket per topic. A background driver
//! task connects, keeps the session alive with pings, parses inbound frames
//! into the topic's envelope type and dispatches them through the
//! connection's [`EventRouter`]. Unexpected drops are retried forever with
//! capped exponential backoff until [`ChannelConnection::disconnect`] is
//! called.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex, Notify};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::backoff::Backoff;
use super::config::ChannelConfig;
use super::error::ChannelError;
use super::messages::{parse_inbound, ClientMessage, Envelope, Inbound};
use super::metrics::ChannelMetrics;
use super::router::{EventRouter, Subscription};
use super::topic::Topic;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Held by a driver for as long as it may own a socket. A new driver waits
/// for the previous one to let go, so a topic never has two transports open.
pub(crate) type TransportGate = AsyncMutex<()>;

/// Upper bound on the close handshake before the socket is dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle state of a channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Not connected and not trying to.
    Closed,
    /// Handshake in progress.
    Connecting,
    /// Session established.
    Open,
    /// Waiting out a backoff delay after a drop or failed attempt.
    Reconnecting,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Connectivity as shown to an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connectivity {
    /// Session open.
    Online,
    /// Trying to (re)connect.
    Connecting,
    /// Closed, or failing repeatedly.
    Offline,
}

/// Snapshot of a connection's state, published on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStatus {
    /// Lifecycle state.
    pub state: ChannelState,
    /// Consecutive failed attempts since the last open session.
    pub attempt: u32,
    /// Derived connectivity.
    pub connectivity: Connectivity,
}

impl ChannelStatus {
    /// The status of a connection that is not running.
    pub const CLOSED: Self = Self {
        state: ChannelState::Closed,
        attempt: 0,
        connectivity: Connectivity::Offline,
    };

    /// Builds a status, deriving connectivity from the attempt count.
    #[must_use]
    pub const fn derive(state: ChannelState, attempt: u32, offline_after_attempts: u32) -> Self {
        let connectivity = match state {
            ChannelState::Open => Connectivity::Online,
            ChannelState::Closed => Connectivity::Offline,
            ChannelState::Connecting | ChannelState::Reconnecting => {
                if attempt >= offline_after_attempts {
                    Connectivity::Offline
                } else {
                    Connectivity::Connecting
                }
            }
        };
        Self {
            state,
            attempt,
            connectivity,
        }
    }
}

/// Why a session ended.
enum SessionEnd {
    Shutdown,
    Dropped(String),
}

struct Inner<E: Envelope> {
    topic: Topic,
    config: ChannelConfig,
    router: EventRouter<E>,
    metrics: Arc<ChannelMetrics>,
    status: watch::Sender<ChannelStatus>,
    /// Incremented on every connect and disconnect; a driver only publishes
    /// while its generation is current.
    generation: AtomicU64,
    outbound: Mutex<Option<(u64, mpsc::UnboundedSender<Message>)>>,
    interests: Mutex<BTreeSet<String>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    nudge: Notify,
    gate: Arc<TransportGate>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<E: Envelope> Inner<E> {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn publish(&self, generation: u64, state: ChannelState, attempt: u32) {
        let status = ChannelStatus::derive(state, attempt, self.config.offline_after_attempts);
        let changed = self.status.send_if_modified(|current| {
            if !self.is_current(generation) || *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            debug!(topic = %self.topic, %state, attempt, "channel state changed");
        }
    }

    fn attach_outbound(&self, generation: u64, tx: mpsc::UnboundedSender<Message>) {
        let mut slot = lock(&self.outbound);
        if self.is_current(generation) {
            *slot = Some((generation, tx));
        }
    }

    fn detach_outbound(&self, generation: u64) {
        let mut slot = lock(&self.outbound);
        if matches!(*slot, Some((g, _)) if g == generation) {
            *slot = None;
        }
    }

    fn handle_text(&self, text: &str) {
        match parse_inbound::<E>(text) {
            Ok(Inbound::Control(frame)) => {
                trace!(topic = %self.topic, ?frame, "control frame");
            }
            Ok(Inbound::Event(envelope)) => {
                self.metrics.record_envelope();
                let outcome = self.router.dispatch(&envelope);
                if outcome.failed > 0 {
                    self.metrics
                        .record_handler_failures(u64::try_from(outcome.failed).unwrap_or(u64::MAX));
                }
            }
            Err(e) => {
                self.metrics.record_parse_failure();
                warn!(topic = %self.topic, error = %e, "dropping unparseable frame");
            }
        }
    }
}

/// A persistent, self-healing connection to one push topic.
///
/// Dropping the connection disconnects it.
pub struct ChannelConnection<E: Envelope> {
    inner: Arc<Inner<E>>,
}

impl<E: Envelope> fmt::Debug for ChannelConnection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConnection")
            .field("topic", &self.inner.topic)
            .field("status", &*self.inner.status.borrow())
            .finish()
    }
}

impl<E: Envelope> ChannelConnection<E> {
    /// Creates a closed connection for `topic`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the topic is empty.
    pub fn new(topic: Topic, config: ChannelConfig) -> Result<Self, ChannelError> {
        Self::with_gate(topic, config, Arc::new(TransportGate::new(())))
    }

    /// Creates a closed connection whose drivers take turns on `gate`.
    pub(crate) fn with_gate(
        topic: Topic,
        config: ChannelConfig,
        gate: Arc<TransportGate>,
    ) -> Result<Self, ChannelError> {
        config.validate()?;
        if topic.is_empty() {
            return Err(ChannelError::InvalidConfig("topic path is empty".to_string()));
        }

        let (status, _) = watch::channel(ChannelStatus::CLOSED);

        Ok(Self {
            inner: Arc::new(Inner {
                topic,
                config,
                router: EventRouter::new(),
                metrics: Arc::new(ChannelMetrics::new()),
                status,
                generation: AtomicU64::new(0),
                outbound: Mutex::new(None),
                interests: Mutex::new(BTreeSet::new()),
                shutdown: Mutex::new(None),
                nudge: Notify::new(),
                gate,
            }),
        })
    }

    /// Returns the topic.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.inner.topic
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Returns the router that receives this connection's envelopes.
    #[must_use]
    pub fn router(&self) -> &EventRouter<E> {
        &self.inner.router
    }

    /// Registers a handler on this connection's router.
    pub fn on<F>(&self, kind: E::Kind, handler: F) -> Subscription
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.router.on(kind, handler)
    }

    /// Returns the connection metrics.
    #[must_use]
    pub fn metrics(&self) -> Arc<ChannelMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Subscribes to status changes.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ChannelStatus> {
        self.inner.status.subscribe()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.inner.status.borrow().state
    }

    /// Returns true while a session is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        lock(&self.inner.outbound).is_some()
    }

    /// Returns the remembered company interests.
    #[must_use]
    pub fn interests(&self) -> Vec<String> {
        lock(&self.inner.interests).iter().cloned().collect()
    }

    /// Starts the connection driver with `token`.
    ///
    /// Does nothing if the driver is already running. Must be called from
    /// within a Tokio runtime.
    pub fn connect(&self, token: impl Into<String>) {
        let mut shutdown_slot = lock(&self.inner.shutdown);
        if shutdown_slot.is_some() {
            debug!(topic = %self.inner.topic, "connect ignored, driver already running");
            return;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *shutdown_slot = Some(shutdown_tx);
        drop(shutdown_slot);

        let url = self
            .inner
            .config
            .connection_url(&self.inner.topic, &token.into());
        info!(topic = %self.inner.topic, "starting channel");
        self.inner.publish(generation, ChannelState::Connecting, 0);

        let inner = Arc::clone(&self.inner);
        let gate = Arc::clone(&self.inner.gate);
        tokio::spawn(async move {
            let _turn = gate.lock_owned().await;
            drive(inner, generation, url, shutdown_rx).await;
        });
    }

    /// Sends `message` if a session is open.
    ///
    /// Returns false, without queueing, when the connection is not open.
    pub fn send(&self, message: &ClientMessage) -> bool {
        let Some(tx) = lock(&self.inner.outbound).as_ref().map(|(_, tx)| tx.clone()) else {
            debug!(topic = %self.inner.topic, ?message, "send skipped, channel not open");
            return false;
        };

        match message.to_json() {
            Ok(json) => tx.send(Message::Text(json.into())).is_ok(),
            Err(e) => {
                warn!(topic = %self.inner.topic, error = %e, "failed to serialize message");
                false
            }
        }
    }

    /// Scopes the feed to `company_id`.
    ///
    /// The interest is remembered and re-sent after every reconnect. Returns
    /// true if the message went out immediately.
    pub fn subscribe_company(&self, company_id: impl Into<String>) -> bool {
        let company_id = company_id.into();
        lock(&self.inner.interests).insert(company_id.clone());
        self.send(&ClientMessage::SubscribeCompany { company_id })
    }

    /// Drops the `company_id` scope.
    pub fn unsubscribe_company(&self, company_id: &str) -> bool {
        lock(&self.inner.interests).remove(company_id);
        self.send(&ClientMessage::UnsubscribeCompany {
            company_id: company_id.to_string(),
        })
    }

    /// Cuts a pending backoff delay short and resets the attempt counter.
    ///
    /// Returns false unless the connection is waiting to reconnect.
    pub fn reconnect_now(&self) -> bool {
        if self.state() != ChannelState::Reconnecting {
            return false;
        }
        debug!(topic = %self.inner.topic, "immediate reconnect requested");
        self.inner.nudge.notify_one();
        true
    }

    /// Closes the connection without reconnecting.
    ///
    /// The driver sends a close frame if a session is open. A later
    /// [`connect`](Self::connect) opens its socket only after the old one is
    /// gone.
    pub fn disconnect(&self) {
        let Some(shutdown) = lock(&self.inner.shutdown).take() else {
            return;
        };

        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let _ = shutdown.send(true);
        *lock(&self.inner.outbound) = None;
        self.inner.status.send_replace(ChannelStatus::CLOSED);
        info!(topic = %self.inner.topic, "channel disconnected");
    }
}

impl<E: Envelope> Drop for ChannelConnection<E> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Connection driver: connect, run the session, back off, repeat.
async fn drive<E: Envelope>(
    inner: Arc<Inner<E>>,
    generation: u64,
    url: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new(inner.config.reconnect.clone());

    loop {
        if *shutdown.borrow() {
            break;
        }
        inner.publish(generation, ChannelState::Connecting, backoff.attempt());

        let connected = tokio::select! {
            _ = shutdown.changed() => break,
            result = tokio_tungstenite::connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((stream, _)) => {
                backoff.reset();
                match run_session(&inner, generation, stream, &mut shutdown).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Dropped(reason) => {
                        warn!(topic = %inner.topic, %reason, "channel dropped");
                    }
                }
            }
            Err(e) => {
                inner.metrics.record_connect_failure();
                warn!(topic = %inner.topic, error = %e, attempt = backoff.attempt(), "channel connect failed");
            }
        }

        let delay = backoff.next_delay();
        inner.publish(generation, ChannelState::Reconnecting, backoff.attempt());
        info!(
            topic = %inner.topic,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt = backoff.attempt(),
            "reconnecting"
        );

        tokio::select! {
            _ = shutdown.changed() => break,
            () = time::sleep(delay) => {}
            () = inner.nudge.notified() => backoff.reset(),
        }
    }

    inner.publish(generation, ChannelState::Closed, 0);
    debug!(topic = %inner.topic, "channel driver stopped");
}

/// Runs one open session until it drops or shutdown is requested.
async fn run_session<E: Envelope>(
    inner: &Inner<E>,
    generation: u64,
    stream: WsStream,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut sink, mut source) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    inner.attach_outbound(generation, tx);
    inner.publish(generation, ChannelState::Open, 0);
    inner.metrics.record_session_opened();
    info!(topic = %inner.topic, "channel open");

    let interests: Vec<String> = lock(&inner.interests).iter().cloned().collect();
    for company_id in interests {
        if let Ok(json) = (ClientMessage::SubscribeCompany { company_id }).to_json() {
            if sink.send(Message::Text(json.into())).await.is_ok() {
                inner.metrics.record_message_sent();
            }
        }
    }

    let period = inner.config.heartbeat_interval;
    let mut heartbeat = time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let end = loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let close = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "".into(),
                };
                let handshake = async {
                    if sink.send(Message::Close(Some(close))).await.is_err() {
                        return;
                    }
                    while let Some(Ok(frame)) = source.next().await {
                        if frame.is_close() {
                            break;
                        }
                    }
                };
                if time::timeout(CLOSE_TIMEOUT, handshake).await.is_err() {
                    debug!(topic = %inner.topic, "close handshake timed out");
                }
                break SessionEnd::Shutdown;
            }
            _ = heartbeat.tick() => {
                let Ok(ping) = ClientMessage::Ping.to_json() else {
                    continue;
                };
                if let Err(e) = sink.send(Message::Text(ping.into())).await {
                    break SessionEnd::Dropped(e.to_string());
                }
                inner.metrics.record_ping();
                trace!(topic = %inner.topic, "ping sent");
            }
            Some(message) = rx.recv() => {
                if let Err(e) = sink.send(message).await {
                    break SessionEnd::Dropped(e.to_string());
                }
                inner.metrics.record_message_sent();
            }
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => inner.handle_text(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map_or_else(
                        || "closed by server".to_string(),
                        |f| format!("closed by server ({}: {})", f.code, f.reason),
                    );
                    break SessionEnd::Dropped(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break SessionEnd::Dropped(e.to_string()),
                None => break SessionEnd::Dropped("stream ended".to_string()),
            },
        }
    };

    inner.detach_outbound(generation);
    inner.metrics.record_session_closed();
    end
}
