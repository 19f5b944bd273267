//! Telemetry Relay - Device Telemetry Agent
//!
//! Periodically samples device telemetry (memory pressure, network
//! throughput, storage, battery) and publishes each snapshot to an MQTT
//! broker over mutually authenticated TLS, falling back to local files when
//! no session is available.
//!
//! # Architecture
//!
//! - **Sampler**: OS counters behind the [`MetricsSource`] trait
//! - **Snapshot**: Immutable per-tick record and its canonical JSON payload
//! - **Storage**: Single-writer thread for offline snapshots and the durable log
//! - **Delivery**: Keystore bootstrap, connection state machine, MQTT transport
//! - **Collection**: Fixed-interval loop tying the pipeline together
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use telemetry_relay::{
//!     CollectionLoop, CredentialConfig, CredentialStore, DeliveryConnection, MqttBroker,
//!     MqttConfig, Sampler, Schedule, StorageBuilder, SystemSource,
//! };
//!
//! let storage = StorageBuilder::new("data").build()?;
//! let mqtt = MqttConfig::new("iot.example.com", "device-1");
//! let delivery = Arc::new(DeliveryConnection::new(
//!     Arc::new(MqttBroker::new(mqtt.clone())),
//!     Arc::new(CredentialStore::new(CredentialConfig::default())),
//!     mqtt.delivery(),
//! ));
//! let collection = CollectionLoop::new(
//!     Sampler::new(SystemSource::new("/")),
//!     delivery,
//!     storage.writer.clone(),
//!     "device-1",
//!     Schedule::default(),
//! );
//! collection.start().await?;
//! ```

pub mod collection;
pub mod config;
pub mod delivery;
pub mod sampler;
pub mod snapshot;
pub mod storage;

pub use collection::{
    CollectionError, CollectionLoop, DeliveryOutcome, DisplayUpdate, LoopState, Schedule,
    TickOutcome,
};
pub use config::{AppConfig, ConfigError};
pub use delivery::{
    Broker, BrokerEvent, ConnectionStatus, CredentialConfig, CredentialError, CredentialStore,
    DeliveryConfig, DeliveryConnection, DeliveryError, Keystore, MqttBroker, MqttConfig, QoS,
    StatusReceiver, StatusReporter,
};
pub use sampler::{
    BatteryReading, MemoryReading, MetricsFields, MetricsSource, NetworkCounters, Sampler,
    SamplerError, StorageReading, SystemSource,
};
pub use snapshot::{MetricsSnapshot, SnapshotError};
pub use storage::{RecordKind, StorageBuilder, StorageError, StorageHandles, StorageWriter};
