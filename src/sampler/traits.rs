//! Source trait and raw reading types.

use thiserror::Error;

/// Errors raised while querying a metrics source.
///
/// Every variant is treated as "sampling unavailable" by the sampler: the
/// affected field is defaulted and the tick continues.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// The OS query returned nothing usable.
    #[error("{metric} unavailable: {reason}")]
    Unavailable {
        /// Which reading failed (e.g. "memory", "battery").
        metric: &'static str,
        /// Human-readable cause.
        reason: String,
    },

    /// Reading a counter file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SamplerError {
    /// Shorthand for [`SamplerError::Unavailable`].
    pub fn unavailable(metric: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            metric,
            reason: reason.into(),
        }
    }
}

/// Physical memory counters, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryReading {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

/// Cumulative network byte counters since boot.
///
/// Threaded explicitly from one tick to the next: each sample consumes the
/// previous counters and yields the new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl NetworkCounters {
    /// Baseline used before any reading has been taken.
    pub const ZERO: Self = Self {
        rx_bytes: 0,
        tx_bytes: 0,
    };

    pub fn new(rx_bytes: u64, tx_bytes: u64) -> Self {
        Self { rx_bytes, tx_bytes }
    }
}

/// Filesystem block counts for the data partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageReading {
    pub block_size: u64,
    pub available_blocks: u64,
    pub total_blocks: u64,
}

impl StorageReading {
    pub fn available_bytes(&self) -> u64 {
        self.available_blocks.saturating_mul(self.block_size)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_blocks.saturating_mul(self.block_size)
    }
}

/// Latest known battery state.
///
/// Each field is optional because power-supply drivers expose different
/// subsets. `temp_tenths` is the raw sensor value in tenths of a degree Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatteryReading {
    pub level: Option<i64>,
    pub scale: Option<i64>,
    pub temp_tenths: Option<i64>,
}

/// A provider of instantaneous device counters.
///
/// Implementations perform the system calls; all derivation happens in
/// [`compute`](crate::sampler::compute), which keeps the arithmetic testable
/// without a real device.
pub trait MetricsSource: Send + 'static {
    /// Total and available physical memory.
    fn memory(&mut self) -> Result<MemoryReading, SamplerError>;

    /// Cumulative received/transmitted bytes across all interfaces.
    fn network_counters(&mut self) -> Result<NetworkCounters, SamplerError>;

    /// Block counts of the primary data partition.
    fn storage(&mut self) -> Result<StorageReading, SamplerError>;

    /// Latest battery state.
    fn battery(&mut self) -> Result<BatteryReading, SamplerError>;
}
