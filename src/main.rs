//! Telemetry Relay Binary Entry Point
//!
//! Runs the collection loop headless, printing each display update through
//! `tracing`. Core functionality is provided by the `telemetry_relay` crate.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use telemetry_relay::{
    CollectionLoop, CredentialStore, DeliveryConnection, DisplayUpdate, MqttBroker, RecordKind,
    Sampler, StorageBuilder, SystemSource,
    config::{AppConfig, parse_duration},
};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Telemetry Relay - device telemetry to MQTT with offline fallback
#[derive(Parser, Debug)]
#[command(name = "telemetry-relay", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "TELEMETRY_RELAY_CONFIG"
    )]
    config: String,

    /// Device id (overrides config file)
    #[arg(long, env = "TELEMETRY_RELAY_DEVICE_ID")]
    device_id: Option<String>,

    /// Broker endpoint host (overrides config file)
    #[arg(long, env = "TELEMETRY_RELAY_ENDPOINT")]
    endpoint: Option<String>,

    /// Collection interval, e.g. `5s` (overrides config file)
    #[arg(long, env = "TELEMETRY_RELAY_INTERVAL", value_parser = parse_duration)]
    interval: Option<Duration>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,telemetry_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Telemetry Relay - device telemetry agent");

    let cli = Cli::parse();

    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::read(&cli.config)?;

    // CLI > ENV > config file; derived fields are filled after overrides.
    if let Some(device_id) = cli.device_id {
        config.device.id = device_id;
    }
    if let Some(endpoint) = cli.endpoint {
        config.broker.endpoint = endpoint;
    }
    if let Some(interval) = cli.interval {
        config.collection.interval = interval;
    }
    config.resolve();
    config.validate()?;

    tracing::info!(
        device_id = %config.device.id,
        endpoint = %config.broker.endpoint,
        port = config.broker.port,
        topic = %config.broker.topic,
        interval = ?config.collection.interval,
        "Configuration loaded"
    );

    // Build storage layer
    let handles = StorageBuilder::new(&config.storage.root)
        .metrics_dir(config.storage.metrics_dir.clone())
        .logs_dir(config.storage.logs_dir.clone())
        .channel_capacity(config.storage.channel_capacity)
        .build()?;

    let pending = handles.writer.list(RecordKind::Metrics).await?;
    if !pending.is_empty() {
        tracing::info!(
            count = pending.len(),
            dir = %handles.metrics_dir.display(),
            "Offline snapshots pending upload"
        );
    }

    // Delivery
    let delivery = Arc::new(DeliveryConnection::new(
        Arc::new(MqttBroker::new(config.broker.clone())),
        Arc::new(CredentialStore::new(config.credentials.clone())),
        config.broker.delivery(),
    ));

    let status_task = tokio::spawn(report_status(delivery.subscribe()));

    // Collection
    let sampler = Sampler::new(SystemSource::new(&config.collection.data_partition));
    let collection = CollectionLoop::new(
        sampler,
        Arc::clone(&delivery),
        handles.writer.clone(),
        config.device.id.clone(),
        config.collection.schedule(),
    );
    let display_task = tokio::spawn(report_display(collection.subscribe()));

    collection.start().await?;
    tracing::info!("Press Ctrl+C to shutdown");

    shutdown_signal().await;

    if let Err(e) = collection.stop().await {
        tracing::error!("Failed to stop collection loop: {}", e);
    }
    if let Err(e) = delivery.disconnect().await {
        tracing::warn!("Broker disconnect failed: {}", e);
    }
    status_task.abort();
    display_task.abort();

    let dropped = handles.writer.dropped_logs();
    if dropped > 0 {
        tracing::warn!(dropped, "Log lines dropped due to full writer queue");
    }
    if let Err(e) = tokio::task::spawn_blocking(move || handles.shutdown()).await? {
        tracing::error!("Failed to shutdown storage: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Log every connection status change.
async fn report_status(mut rx: telemetry_relay::StatusReceiver) {
    while rx.changed().await.is_ok() {
        let status = rx.borrow_and_update().clone();
        tracing::info!(status = %status, "Broker connection");
    }
}

/// Print each tick's display lines.
async fn report_display(mut rx: watch::Receiver<Option<DisplayUpdate>>) {
    while rx.changed().await.is_ok() {
        let Some(update) = rx.borrow_and_update().clone() else {
            continue;
        };
        tracing::info!(
            connection = %update.connection,
            "{} | {} | {} | {} | {}",
            update.cpu_usage_text,
            update.network_speed_text,
            update.storage_text,
            update.battery_text,
            update.status_text,
        );
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
