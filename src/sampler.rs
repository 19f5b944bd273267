//! Metrics Sampler
//!
//! Reads instantaneous device counters and derives the values a snapshot
//! carries.
//!
//! # Components
//!
//! - [`MetricsSource`]: Trait over the raw OS queries
//! - [`SystemSource`]: Host implementation (sysinfo, statvfs, power-supply sysfs)
//! - [`compute`]: Pure derivation of [`MetricsFields`] from [`RawReadings`]
//! - [`Sampler`]: Queries a source, defaults unavailable readings, derives fields
//!
//! Network counters are threaded explicitly through [`Sampler::sample`]; the
//! sampler itself keeps no state between ticks.

mod compute;
mod system;
mod traits;

pub use compute::{
    BYTES_PER_KB, BYTES_PER_MB, MetricsFields, RawReadings, Sampler, battery_level_percent,
    battery_temp_celsius, compute, cpu_usage_percent, kb_delta,
};
pub use system::{DEFAULT_DATA_PARTITION, DEFAULT_POWER_SUPPLY_DIR, SystemSource};
pub use traits::{
    BatteryReading, MemoryReading, MetricsSource, NetworkCounters, SamplerError, StorageReading,
};
