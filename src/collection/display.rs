//! Display-ready values published after each tick.

use std::path::PathBuf;

use serde::Serialize;

use crate::delivery::ConnectionStatus;
use crate::snapshot::MetricsSnapshot;

/// What happened to a tick's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Handed to the broker client; not a delivery receipt.
    Sent,
    /// Written to the offline directory.
    SavedLocally(PathBuf),
    /// Neither published nor saved.
    Failed(String),
}

/// Text for each display line, plus the values it was rendered from.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayUpdate {
    pub cpu_usage_text: String,
    pub network_speed_text: String,
    pub storage_text: String,
    pub battery_text: String,
    pub status_text: String,
    pub snapshot: MetricsSnapshot,
    pub outcome: DeliveryOutcome,
    pub connection: ConnectionStatus,
}

impl DisplayUpdate {
    pub fn new(
        snapshot: MetricsSnapshot,
        outcome: DeliveryOutcome,
        connection: ConnectionStatus,
    ) -> Self {
        let status_text = match &outcome {
            DeliveryOutcome::Sent => format!("Data sent at: {}", snapshot.timestamp_iso()),
            DeliveryOutcome::SavedLocally(path) => {
                let name = path
                    .file_name()
                    .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
                format!("Data saved locally: {name}")
            }
            DeliveryOutcome::Failed(reason) => reason.clone(),
        };

        Self {
            cpu_usage_text: format!("CPU Usage: {:.2}%", snapshot.cpu_usage_percent()),
            network_speed_text: format!(
                "Network: Download: {} KB/s | Upload: {} KB/s",
                snapshot.rx_kb_per_sec(),
                snapshot.tx_kb_per_sec()
            ),
            storage_text: format!(
                "Storage: {} MB / {} MB",
                snapshot.storage_used_mb(),
                snapshot.storage_total_mb()
            ),
            battery_text: format!(
                "Battery: {:.1}% | Temp: {:.1}°C",
                snapshot.battery_level_percent(),
                snapshot.battery_temp_celsius()
            ),
            status_text,
            snapshot,
            outcome,
            connection,
        }
    }
}
