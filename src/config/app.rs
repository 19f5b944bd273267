//! Application configuration structures.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collection::{DEFAULT_INTERVAL, MIN_INTERVAL, Schedule};
use crate::delivery::{CredentialConfig, MqttConfig};
use crate::sampler::DEFAULT_DATA_PARTITION;
use crate::storage::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_LOGS_DIR, DEFAULT_METRICS_DIR};

use super::validation::{
    ConfigError, expand_env_vars, require_host, require_non_empty, require_positive,
    require_publish_topic,
};

/// Device id used when neither the config nor the host provides one.
pub const FALLBACK_DEVICE_ID: &str = "unknown-device";

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_data_partition() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_PARTITION)
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_metrics_dir() -> String {
    DEFAULT_METRICS_DIR.to_string()
}

fn default_logs_dir() -> String {
    DEFAULT_LOGS_DIR.to_string()
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

// =============================================================================
// Sections
// =============================================================================

/// Device identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device id carried in every payload. Empty means "use the host name".
    #[serde(default)]
    pub id: String,
}

/// Sampling schedule and sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Tick interval (default: 5s, minimum: 1s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Mount point whose filesystem is reported as device storage.
    #[serde(default = "default_data_partition")]
    pub data_partition: PathBuf,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            data_partition: default_data_partition(),
        }
    }
}

impl CollectionConfig {
    pub fn schedule(&self) -> Schedule {
        Schedule::interval(self.interval)
    }
}

/// Local persistence layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the metrics and logs directories.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    #[serde(default = "default_metrics_dir")]
    pub metrics_dir: String,

    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,

    /// Writer command queue depth (default: 1000).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            metrics_dir: default_metrics_dir(),
            logs_dir: default_logs_dir(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub collection: CollectionConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Broker endpoint and session settings.
    pub broker: MqttConfig,

    #[serde(default)]
    pub credentials: CredentialConfig,
}

impl AppConfig {
    /// Load, resolve and validate configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Read a YAML file without resolving or validating it.
    ///
    /// For callers that apply overrides first; they must call
    /// [`resolve`](Self::resolve) and [`validate`](Self::validate) afterwards.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse YAML text as written, leaving `${VAR}` references and derived
    /// fields untouched.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Parse, resolve and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse(content)?;
        config.resolve();
        config.validate()?;
        Ok(config)
    }

    /// Expand `${VAR}` references and fill derived defaults.
    ///
    /// An empty device id falls back to the host name; an empty client id
    /// takes the device id. Run once, after every override is in place.
    pub fn resolve(&mut self) {
        self.device.id = expand_env_vars(&self.device.id).trim().to_string();
        self.broker.endpoint = expand_env_vars(&self.broker.endpoint).trim().to_string();
        self.broker.client_id = expand_env_vars(&self.broker.client_id).trim().to_string();

        if self.device.id.is_empty() {
            self.device.id = sysinfo::System::host_name()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| FALLBACK_DEVICE_ID.to_string());
        }
        if self.broker.client_id.is_empty() {
            self.broker.client_id = self.device.id.clone();
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_host("broker endpoint", &self.broker.endpoint)?;
        if self.broker.port == 0 {
            return Err(ConfigError::invalid("broker port must be non-zero"));
        }
        require_publish_topic("broker topic", &self.broker.topic)?;
        require_non_empty("broker client_id", &self.broker.client_id)?;
        if self.broker.publish_timeout.is_zero() {
            return Err(ConfigError::invalid("broker publish_timeout must be positive"));
        }
        require_positive(
            "broker max_reconnect_attempts",
            u64::from(self.broker.max_reconnect_attempts),
        )?;
        require_positive("broker channel_capacity", self.broker.channel_capacity as u64)?;

        if self.collection.interval < MIN_INTERVAL {
            return Err(ConfigError::invalid(format!(
                "collection interval must be at least {MIN_INTERVAL:?}"
            )));
        }

        require_positive("storage channel_capacity", self.storage.channel_capacity as u64)?;
        require_non_empty("storage metrics_dir", &self.storage.metrics_dir)?;
        require_non_empty("storage logs_dir", &self.storage.logs_dir)?;
        if self.storage.metrics_dir == self.storage.logs_dir {
            return Err(ConfigError::invalid(
                "storage metrics_dir and logs_dir must differ",
            ));
        }

        Ok(())
    }
}
