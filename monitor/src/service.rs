//! Main monitor service.
//!
//! Keeps a reconciled order board for one store and logs how it changes.

use std::future::Future;

use livedesk_sync::channel::{Connectivity, Subscription, Topic};
use livedesk_sync::events::{AutomationEvent, AutomationEventKind, OrderEvent, OrderEventKind};
use livedesk_sync::{
    ChannelLease, ChannelRegistry, Envelope, Order, OrderFilters, OrdersClient, SyncError,
    SyncedCollection,
};
use tracing::{debug, info, warn};

use super::board::{order_moves, BoardSummary};
use super::config::{ConfigError, MonitorConfig};

/// Errors that stop the monitor from starting.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Channel or client setup failed.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// The board monitor.
pub struct MonitorService {
    /// Configuration.
    config: MonitorConfig,

    /// Order topic connections.
    order_channels: ChannelRegistry<OrderEvent>,

    /// Automation topic connections.
    automation_channels: ChannelRegistry<AutomationEvent>,

    /// Reconciled order board.
    orders: SyncedCollection<OrdersClient>,
}

/// Automation feed held open for the lifetime of a run.
struct AutomationFeed {
    _subscriptions: Vec<Subscription>,
    _lease: ChannelLease<AutomationEvent>,
}

impl MonitorService {
    /// Creates a new monitor.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the client cannot
    /// be built.
    pub fn new(config: MonitorConfig) -> Result<Self, MonitorError> {
        config.validate()?;
        let channel_config = config.channel_config()?;

        let order_channels = ChannelRegistry::new(channel_config.clone()).map_err(SyncError::from)?;
        let automation_channels = ChannelRegistry::new(channel_config).map_err(SyncError::from)?;
        let client = OrdersClient::new(config.client_config()).map_err(SyncError::from)?;
        let orders = SyncedCollection::new(client, OrderFilters::store(&config.store_slug));

        Ok(Self {
            config,
            order_channels,
            automation_channels,
            orders,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Returns the reconciled order board.
    #[must_use]
    pub const fn orders(&self) -> &SyncedCollection<OrdersClient> {
        &self.orders
    }

    /// Returns the order channel registry.
    #[must_use]
    pub const fn order_channels(&self) -> &ChannelRegistry<OrderEvent> {
        &self.order_channels
    }

    /// Runs until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if a channel cannot be acquired.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), MonitorError>
    where
        F: Future<Output = ()>,
    {
        let topic = Topic::store_orders(&self.config.store_slug);
        let lease = self
            .order_channels
            .acquire(topic, &self.config.token)
            .map_err(SyncError::from)?;

        let _refresh_subscriptions = self.orders.refresh_on(lease.router(), &OrderEventKind::CHANGES);
        let refresher = self.orders.spawn_refresher();
        let _automation = match self.config.company_id {
            Some(ref company_id) => Some(self.open_automation_feed(company_id)?),
            None => None,
        };

        info!(store = %self.config.store_slug, "monitor started");
        match self.orders.refresh().await {
            Ok(records) => info!(records, "initial snapshot loaded"),
            Err(e) => warn!(error = %e, "initial snapshot failed"),
        }

        let mut status = lease.status();
        let mut board = self.orders.watch();
        let mut connectivity = status.borrow_and_update().connectivity;
        let mut been_online = connectivity == Connectivity::Online;
        let mut last_view = board.borrow_and_update().clone();
        let mut summary = BoardSummary::from_orders(&last_view);
        info!(%summary, "board");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *status.borrow_and_update();
                    if current.connectivity == connectivity {
                        continue;
                    }
                    info!(
                        topic = %lease.topic(),
                        from = ?connectivity,
                        to = ?current.connectivity,
                        attempt = current.attempt,
                        "connectivity changed"
                    );
                    if current.connectivity == Connectivity::Online {
                        // Events may have been missed while offline.
                        if been_online {
                            self.orders.request_refresh();
                        }
                        been_online = true;
                    }
                    connectivity = current.connectivity;
                }
                changed = board.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = board.borrow_and_update().clone();
                    summary = log_board_change(&last_view, &view, &summary);
                    last_view = view;
                }
            }
        }

        refresher.abort();
        lease.release();
        info!("monitor stopped");
        Ok(())
    }

    fn open_automation_feed(&self, company_id: &str) -> Result<AutomationFeed, MonitorError> {
        let lease = self
            .automation_channels
            .acquire(Topic::automation(), &self.config.token)
            .map_err(SyncError::from)?;
        lease.subscribe_company(company_id);

        let subscriptions = AutomationEventKind::ALL
            .iter()
            .map(|&kind| lease.on(kind, log_automation_event))
            .collect();

        Ok(AutomationFeed {
            _subscriptions: subscriptions,
            _lease: lease,
        })
    }
}

fn log_board_change(previous: &[Order], current: &[Order], summary: &BoardSummary) -> BoardSummary {
    let next = BoardSummary::from_orders(current);

    for change in next.changes_since(summary) {
        debug!(column = ?change.column, before = change.before, after = change.after, "column changed");
    }
    for moved in order_moves(previous, current) {
        let number = moved.order_number.as_deref().unwrap_or(&moved.order_id);
        match moved.from {
            Some(from) => info!(order = number, %from, to = %moved.to, "order moved"),
            None => info!(order = number, status = %moved.to, "order added"),
        }
    }
    if next.total() != summary.total() {
        info!(summary = %next, "board");
    }
    next
}

fn log_automation_event(event: &AutomationEvent) -> anyhow::Result<()> {
    match event.payload() {
        Some(payload) => info!(
            kind = ?event.kind(),
            company = payload.company_id.as_deref().unwrap_or("-"),
            session = payload.session_id.as_deref().unwrap_or("-"),
            "automation event"
        ),
        None => debug!("unrecognized automation event"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_config() -> MonitorConfig {
        MonitorConfig::new("http://127.0.0.1:9/api/v1", "tok", "pastita")
    }

    #[test]
    fn test_service_new() {
        let service = MonitorService::new(create_config()).expect("service");
        assert_eq!(service.config().store_slug, "pastita");
        assert!(service.orders().view().is_empty());
        assert!(service.order_channels().is_empty());
    }

    #[test]
    fn test_service_new_invalid_config() {
        let config = MonitorConfig::new("http://127.0.0.1:9/api/v1", "tok", "");
        assert!(matches!(
            MonitorService::new(config),
            Err(MonitorError::Config(ConfigError::InvalidStoreSlug(_)))
        ));
    }

    #[tokio::test]
    async fn test_service_run_stops_on_shutdown() {
        let service = MonitorService::new(create_config().with_company_id("c-1")).expect("service");

        let result = service.run(async {}).await;

        assert!(result.is_ok());
        assert!(service.order_channels().is_empty());
        assert!(service.orders().view().is_empty());
    }

    #[test]
    fn test_log_automation_event_accepts_unknown() {
        assert!(log_automation_event(&AutomationEvent::Unknown).is_ok());
    }
}
