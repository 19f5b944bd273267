//! Configuration module.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Device identity
//! - Collection schedule and data partition
//! - Local storage layout
//! - Broker endpoint, topic and session settings
//! - Credential asset and keystore locations

mod app;
mod validation;

pub use app::{
    AppConfig, CollectionConfig, DeviceConfig, FALLBACK_DEVICE_ID, StorageConfig,
};
pub use validation::{ConfigError, expand_env_vars, parse_duration};
