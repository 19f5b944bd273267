//! Snapshot Model
//!
//! One immutable bundle of telemetry values captured at a single tick, and
//! its canonical JSON payload:
//!
//! ```text
//! { "deviceId": string, "timestamp": int64-ms, "datetimeISO": string,
//!   "metrics": { "cpuUsage": float, "rxBytes": int64, "txBytes": int64,
//!                "batteryTemp": float, "batteryLevel": float,
//!                "storageAvailable": int64, "storageTotal": int64 } }
//! ```
//!
//! Key order is fixed by field declaration order, so encoding is deterministic.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sampler::{BYTES_PER_MB, MetricsFields};

/// Format of the `datetimeISO` field (UTC, second resolution).
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Errors raised while encoding or decoding a snapshot payload.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// JSON encoding/decoding failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A float field is NaN or infinite and cannot be represented in JSON.
    #[error("non-finite value in field '{0}'")]
    NonFinite(&'static str),
}

/// Immutable telemetry snapshot.
///
/// Created once per tick by [`MetricsSnapshot::build`]; never mutated after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(rename = "deviceId")]
    device_id: String,
    #[serde(rename = "timestamp")]
    timestamp_millis: i64,
    #[serde(rename = "datetimeISO")]
    timestamp_iso: String,
    metrics: SnapshotMetrics,
}

/// Nested `metrics` object of the payload.
///
/// `rx_bytes`/`tx_bytes` carry the per-tick throughput in KB/s; the storage
/// fields carry bytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotMetrics {
    cpu_usage: f64,
    rx_bytes: i64,
    tx_bytes: i64,
    battery_temp: f64,
    battery_level: f64,
    storage_available: i64,
    storage_total: i64,
}

impl MetricsSnapshot {
    /// Assemble a snapshot from sampled fields.
    pub fn build(fields: MetricsFields, device_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp_millis: now.timestamp_millis(),
            timestamp_iso: now.format(ISO_FORMAT).to_string(),
            metrics: SnapshotMetrics {
                cpu_usage: fields.cpu_usage_percent,
                rx_bytes: fields.rx_kb_per_sec,
                tx_bytes: fields.tx_kb_per_sec,
                battery_temp: fields.battery_temp_celsius,
                battery_level: fields.battery_level_percent,
                storage_available: fields.storage_available_bytes,
                storage_total: fields.storage_total_bytes,
            },
        }
    }

    /// Encode to the canonical JSON payload.
    ///
    /// # Errors
    /// Returns [`SnapshotError::NonFinite`] if any float field is NaN or infinite.
    pub fn serialize(&self) -> Result<Vec<u8>, SnapshotError> {
        let m = &self.metrics;
        for (name, value) in [
            ("cpuUsage", m.cpu_usage),
            ("batteryTemp", m.battery_temp),
            ("batteryLevel", m.battery_level),
        ] {
            if !value.is_finite() {
                return Err(SnapshotError::NonFinite(name));
            }
        }
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a payload produced by [`serialize`](Self::serialize).
    pub fn deserialize(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp_millis
    }

    pub fn timestamp_iso(&self) -> &str {
        &self.timestamp_iso
    }

    /// Capture instant, reconstructed from the millisecond timestamp.
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp_millis).single()
    }

    /// Used-memory ratio (memory-pressure proxy, not CPU time).
    pub fn cpu_usage_percent(&self) -> f64 {
        self.metrics.cpu_usage
    }

    pub fn rx_kb_per_sec(&self) -> i64 {
        self.metrics.rx_bytes
    }

    pub fn tx_kb_per_sec(&self) -> i64 {
        self.metrics.tx_bytes
    }

    pub fn storage_available_bytes(&self) -> i64 {
        self.metrics.storage_available
    }

    pub fn storage_total_bytes(&self) -> i64 {
        self.metrics.storage_total
    }

    pub fn storage_available_mb(&self) -> i64 {
        self.metrics.storage_available / BYTES_PER_MB
    }

    pub fn storage_used_mb(&self) -> i64 {
        (self.metrics.storage_total - self.metrics.storage_available).max(0) / BYTES_PER_MB
    }

    pub fn storage_total_mb(&self) -> i64 {
        self.metrics.storage_total / BYTES_PER_MB
    }

    pub fn battery_level_percent(&self) -> f64 {
        self.metrics.battery_level
    }

    pub fn battery_temp_celsius(&self) -> f64 {
        self.metrics.battery_temp
    }
}
