//! Channel metrics tracking.
//!
//! Provides atomic counters for monitoring one push channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metrics for a single channel connection.
#[derive(Debug)]
pub struct ChannelMetrics {
    /// Sessions that reached the open state.
    sessions_opened: AtomicU64,

    /// Sessions that ended, for any reason.
    sessions_closed: AtomicU64,

    /// Failed connection attempts.
    connect_failures: AtomicU64,

    /// Envelopes parsed and dispatched.
    envelopes_received: AtomicU64,

    /// Frames dropped because they could not be parsed.
    parse_failures: AtomicU64,

    /// Handler invocations that returned an error or panicked.
    handler_failures: AtomicU64,

    /// Outbound messages written to the socket.
    messages_sent: AtomicU64,

    /// Keepalive pings written.
    pings_sent: AtomicU64,

    /// Start time for rate calculation.
    start_time: Instant,
}

impl Default for ChannelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelMetrics {
    /// Creates a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions_opened: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            envelopes_received: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            pings_sent: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Records a session opened.
    pub fn record_session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a session closed.
    pub fn record_session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed connection attempt.
    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a dispatched envelope.
    pub fn record_envelope(&self) {
        self.envelopes_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a dropped, unparseable frame.
    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records failed handler invocations.
    pub fn record_handler_failures(&self, count: u64) {
        self.handler_failures.fetch_add(count, Ordering::Relaxed);
    }

    /// Records an outbound message.
    pub fn record_message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a keepalive ping.
    pub fn record_ping(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the sessions opened.
    #[must_use]
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::Relaxed)
    }

    /// Returns the sessions closed.
    #[must_use]
    pub fn sessions_closed(&self) -> u64 {
        self.sessions_closed.load(Ordering::Relaxed)
    }

    /// Returns the number of currently open sessions (zero or one).
    #[must_use]
    pub fn active_sessions(&self) -> u64 {
        self.sessions_opened()
            .saturating_sub(self.sessions_closed())
    }

    /// Returns the failed connection attempts.
    #[must_use]
    pub fn connect_failures(&self) -> u64 {
        self.connect_failures.load(Ordering::Relaxed)
    }

    /// Returns the envelopes received.
    #[must_use]
    pub fn envelopes_received(&self) -> u64 {
        self.envelopes_received.load(Ordering::Relaxed)
    }

    /// Returns the parse failures.
    #[must_use]
    pub fn parse_failures(&self) -> u64 {
        self.parse_failures.load(Ordering::Relaxed)
    }

    /// Returns the handler failures.
    #[must_use]
    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }

    /// Returns the messages sent.
    #[must_use]
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    /// Returns the pings sent.
    #[must_use]
    pub fn pings_sent(&self) -> u64 {
        self.pings_sent.load(Ordering::Relaxed)
    }

    /// Returns the uptime.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns envelopes per second since creation.
    #[must_use]
    pub fn envelopes_per_second(&self) -> f64 {
        let elapsed = self.uptime().as_secs_f64();
        if elapsed > 0.0 {
            self.envelopes_received() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Returns a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> ChannelMetricsSnapshot {
        ChannelMetricsSnapshot {
            sessions_opened: self.sessions_opened(),
            sessions_closed: self.sessions_closed(),
            connect_failures: self.connect_failures(),
            envelopes_received: self.envelopes_received(),
            parse_failures: self.parse_failures(),
            handler_failures: self.handler_failures(),
            messages_sent: self.messages_sent(),
            pings_sent: self.pings_sent(),
            uptime: self.uptime(),
        }
    }
}

/// A point-in-time snapshot of channel metrics.
#[derive(Debug, Clone)]
pub struct ChannelMetricsSnapshot {
    /// Sessions opened.
    pub sessions_opened: u64,
    /// Sessions closed.
    pub sessions_closed: u64,
    /// Failed connection attempts.
    pub connect_failures: u64,
    /// Envelopes received.
    pub envelopes_received: u64,
    /// Unparseable frames dropped.
    pub parse_failures: u64,
    /// Failed handler invocations.
    pub handler_failures: u64,
    /// Outbound messages.
    pub messages_sent: u64,
    /// Keepalive pings.
    pub pings_sent: u64,
    /// Uptime.
    pub uptime: Duration,
}
