//! Derivation of snapshot fields from raw readings.

use crate::sampler::traits::{
    BatteryReading, MemoryReading, MetricsSource, NetworkCounters, SamplerError, StorageReading,
};

/// Bytes per kilobyte used for throughput values.
pub const BYTES_PER_KB: u64 = 1024;

/// Bytes per megabyte used for storage values.
pub const BYTES_PER_MB: i64 = 1024 * 1024;

/// Raw readings from one pass over a [`MetricsSource`].
///
/// `None` marks a reading that was unavailable on this tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawReadings {
    pub memory: Option<MemoryReading>,
    pub network: Option<NetworkCounters>,
    pub storage: Option<StorageReading>,
    pub battery: Option<BatteryReading>,
}

/// Fully populated metric values for one tick.
///
/// `cpu_usage_percent` is the used-memory ratio, a memory-pressure proxy and
/// not CPU time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsFields {
    pub cpu_usage_percent: f64,
    pub rx_kb_per_sec: i64,
    pub tx_kb_per_sec: i64,
    pub storage_available_bytes: i64,
    pub storage_total_bytes: i64,
    pub battery_level_percent: f64,
    pub battery_temp_celsius: f64,
}

/// Throughput between two cumulative counter values, in KB.
///
/// A counter that went backwards (interface reset) yields zero.
pub fn kb_delta(current: u64, previous: u64) -> i64 {
    i64::try_from(current.saturating_sub(previous) / BYTES_PER_KB).unwrap_or(i64::MAX)
}

/// Used-memory percentage, or 0.0 when total memory is unknown.
pub fn cpu_usage_percent(memory: &MemoryReading) -> f64 {
    if memory.total_bytes == 0 {
        return 0.0;
    }
    let used = memory.total_bytes.saturating_sub(memory.available_bytes);
    used as f64 / memory.total_bytes as f64 * 100.0
}

/// Battery level as a percentage of the reported scale.
pub fn battery_level_percent(battery: &BatteryReading) -> f64 {
    match (battery.level, battery.scale) {
        (Some(level), Some(scale)) if level >= 0 && scale > 0 => {
            level as f64 * 100.0 / scale as f64
        }
        _ => 0.0,
    }
}

/// Battery temperature in degrees Celsius.
pub fn battery_temp_celsius(battery: &BatteryReading) -> f64 {
    battery.temp_tenths.map_or(0.0, |t| t as f64 / 10.0)
}

/// Derive snapshot fields from raw readings and the previous counters.
///
/// Returns the fields together with the counters to feed into the next call.
/// On the first call the caller passes [`NetworkCounters::ZERO`], so the
/// reported speed is the total traffic since boot divided by 1024. When the
/// network reading is unavailable the speed is zero and the previous
/// counters are carried forward unchanged.
pub fn compute(readings: &RawReadings, previous: NetworkCounters) -> (MetricsFields, NetworkCounters) {
    let cpu_usage_percent = readings.memory.as_ref().map_or(0.0, cpu_usage_percent);

    let (rx_kb_per_sec, tx_kb_per_sec, next) = match readings.network {
        Some(current) => (
            kb_delta(current.rx_bytes, previous.rx_bytes),
            kb_delta(current.tx_bytes, previous.tx_bytes),
            current,
        ),
        None => (0, 0, previous),
    };

    let (storage_available_bytes, storage_total_bytes) = readings.storage.map_or((0, 0), |s| {
        (
            i64::try_from(s.available_bytes()).unwrap_or(i64::MAX),
            i64::try_from(s.total_bytes()).unwrap_or(i64::MAX),
        )
    });

    let battery = readings.battery.unwrap_or_default();

    let fields = MetricsFields {
        cpu_usage_percent,
        rx_kb_per_sec,
        tx_kb_per_sec,
        storage_available_bytes,
        storage_total_bytes,
        battery_level_percent: battery_level_percent(&battery),
        battery_temp_celsius: battery_temp_celsius(&battery),
    };

    (fields, next)
}

/// Samples a [`MetricsSource`] and derives snapshot fields.
pub struct Sampler {
    source: Box<dyn MetricsSource>,
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler").finish_non_exhaustive()
    }
}

impl Sampler {
    pub fn new(source: impl MetricsSource) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// Query every reading once. Failed queries are logged and left empty.
    pub fn read(&mut self) -> RawReadings {
        RawReadings {
            memory: available("memory", self.source.memory()),
            network: available("network", self.source.network_counters()),
            storage: available("storage", self.source.storage()),
            battery: available("battery", self.source.battery()),
        }
    }

    /// Take one sample against the previous counters.
    pub fn sample(&mut self, previous: NetworkCounters) -> (MetricsFields, NetworkCounters) {
        let readings = self.read();
        compute(&readings, previous)
    }
}

fn available<T>(metric: &str, result: Result<T, SamplerError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(metric, error = %e, "Sampling unavailable, using default");
            None
        }
    }
}
