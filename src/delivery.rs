//! Broker delivery.
//!
//! - [`CredentialStore`]: one-time keystore bootstrap from bundled PEM assets
//! - [`DeliveryConnection`]: connect, publish, disconnect, status observation
//! - [`ConnectionStatus`]: state machine driven by [`BrokerEvent`]s
//! - [`Broker`]: transport contract, implemented by [`MqttBroker`]

mod backoff;
mod broker;
mod connection;
mod credentials;
mod mqtt;
mod status;

pub use backoff::Backoff;
pub use broker::{Broker, DeliveryError, QoS};
pub use connection::{DEFAULT_PUBLISH_TIMEOUT, DEFAULT_TOPIC, DeliveryConfig, DeliveryConnection};
pub use credentials::{
    CredentialConfig, CredentialError, CredentialStore, DEFAULT_CLIENT_CERT, DEFAULT_PRIVATE_KEY,
    DEFAULT_ROOT_CA, KEYSTORE_FILE, Keystore,
};
pub use mqtt::{DEFAULT_PORT, MAX_RECONNECT_BACKOFF, MqttBroker, MqttConfig};
pub use status::{BrokerEvent, ConnectionStatus, StatusReceiver, StatusReporter, transition};

#[cfg(test)]
pub(crate) use connection::tests::MockBroker;
#[cfg(test)]
pub(crate) use credentials::tests::provisioned;
