//! Livedesk Monitor binary.
//!
//! Entry point for the headless order board monitor.

use anyhow::Context;
use livedesk_monitor::{MonitorConfig, MonitorService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,livedesk_sync=debug,livedesk_monitor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MonitorConfig::from_env().context("loading configuration")?;

    tracing::info!("Starting Livedesk Monitor");
    tracing::info!("API URL: {}", config.api_url);
    tracing::info!("Store: {}", config.store_slug);
    if let Some(ref company_id) = config.company_id {
        tracing::info!("Company: {}", company_id);
    }

    let service = MonitorService::new(config)?;
    service
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    tracing::info!("Shutting down monitor");
    Ok(())
}
