//! Production metrics source backed by the host OS.
//!
//! - Memory and network counters come from `sysinfo`.
//! - Storage comes from `statvfs(3)` on the configured data partition.
//! - Battery state comes from the power-supply sysfs class, which is where
//!   both Linux and Android kernels publish `capacity` and `temp`.

use std::path::{Path, PathBuf};

use sysinfo::{Networks, System};

use crate::sampler::traits::{
    BatteryReading, MemoryReading, MetricsSource, NetworkCounters, SamplerError, StorageReading,
};

/// Default partition whose usage is reported.
pub const DEFAULT_DATA_PARTITION: &str = "/";

/// Default sysfs power-supply class directory.
pub const DEFAULT_POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

/// Battery capacity in sysfs is always a percentage.
const SYSFS_CAPACITY_SCALE: i64 = 100;

/// Loopback traffic never leaves the device and is excluded from throughput.
const LOOPBACK_INTERFACE: &str = "lo";

/// Host-backed [`MetricsSource`].
pub struct SystemSource {
    system: System,
    networks: Networks,
    data_partition: PathBuf,
    power_supply_dir: PathBuf,
}

impl SystemSource {
    /// Create a source reporting storage for `data_partition`.
    pub fn new(data_partition: impl AsRef<Path>) -> Self {
        Self {
            system: System::new(),
            networks: Networks::new_with_refreshed_list(),
            data_partition: data_partition.as_ref().to_path_buf(),
            power_supply_dir: PathBuf::from(DEFAULT_POWER_SUPPLY_DIR),
        }
    }

    /// Override the power-supply directory (useful for tests and containers).
    pub fn with_power_supply_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.power_supply_dir = dir.as_ref().to_path_buf();
        self
    }

    fn battery_dir(&self) -> Result<PathBuf, SamplerError> {
        let entries = std::fs::read_dir(&self.power_supply_dir)?;
        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .find(|path| {
                read_trimmed(&path.join("type")).is_some_and(|kind| kind.eq_ignore_ascii_case("battery"))
            })
            .ok_or_else(|| SamplerError::unavailable("battery", "no battery power supply found"))
    }
}

impl std::fmt::Debug for SystemSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemSource")
            .field("data_partition", &self.data_partition)
            .field("power_supply_dir", &self.power_supply_dir)
            .finish_non_exhaustive()
    }
}

impl MetricsSource for SystemSource {
    fn memory(&mut self) -> Result<MemoryReading, SamplerError> {
        self.system.refresh_memory();
        let total_bytes = self.system.total_memory();
        if total_bytes == 0 {
            return Err(SamplerError::unavailable("memory", "total memory reported as zero"));
        }
        Ok(MemoryReading {
            total_bytes,
            available_bytes: self.system.available_memory(),
        })
    }

    fn network_counters(&mut self) -> Result<NetworkCounters, SamplerError> {
        self.networks.refresh();
        let counters = self
            .networks
            .iter()
            .filter(|(name, _)| name.as_str() != LOOPBACK_INTERFACE)
            .fold(NetworkCounters::ZERO, |acc, (_, data)| NetworkCounters {
                rx_bytes: acc.rx_bytes.saturating_add(data.total_received()),
                tx_bytes: acc.tx_bytes.saturating_add(data.total_transmitted()),
            });
        Ok(counters)
    }

    #[allow(clippy::unnecessary_cast)]
    fn storage(&mut self) -> Result<StorageReading, SamplerError> {
        let stat = nix::sys::statvfs::statvfs(self.data_partition.as_path())
            .map_err(|e| SamplerError::unavailable("storage", e.to_string()))?;
        // fsblkcnt_t and c_ulong widths differ between targets.
        Ok(StorageReading {
            block_size: stat.fragment_size() as u64,
            available_blocks: stat.blocks_available() as u64,
            total_blocks: stat.blocks() as u64,
        })
    }

    fn battery(&mut self) -> Result<BatteryReading, SamplerError> {
        let dir = self.battery_dir()?;
        let level = read_i64(&dir.join("capacity"));
        Ok(BatteryReading {
            level,
            scale: level.map(|_| SYSFS_CAPACITY_SCALE),
            temp_tenths: read_i64(&dir.join("temp")),
        })
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
}

fn read_i64(path: &Path) -> Option<i64> {
    read_trimmed(path).and_then(|s| s.parse().ok())
}
