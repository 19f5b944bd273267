//! Broker contract consumed by the delivery connection.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::delivery::credentials::{CredentialError, Keystore};
use crate::delivery::status::{ConnectionStatus, StatusReporter};

/// Errors that can occur while delivering a payload.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Keystore could not be created or loaded.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Publish attempted while the connection is not usable.
    #[error("not connected (status: {0})")]
    NotConnected(ConnectionStatus),

    /// Broker transport rejected or failed the request.
    #[error("transport error: {0}")]
    Transport(String),

    /// Publish did not complete in time.
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
}

/// MQTT delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
}

impl TryFrom<u8> for QoS {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            other => Err(format!("unsupported qos level {other}, expected 0 or 1")),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
        }
    }
}

/// Minimal broker client.
///
/// `connect` returns once the request is issued. Progress is reported through
/// the [`StatusReporter`] the broker is handed, never by the return value.
#[async_trait::async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Issue a connect using the given keystore.
    async fn connect(
        &self,
        keystore: Arc<Keystore>,
        reporter: StatusReporter,
    ) -> Result<(), DeliveryError>;

    /// Publish `payload` on `topic`.
    ///
    /// Success means the transport accepted the message for sending, not
    /// that the broker acknowledged it. Callers bound the call with their
    /// publish timeout.
    async fn publish(&self, payload: Vec<u8>, topic: &str, qos: QoS) -> Result<(), DeliveryError>;

    /// Tear the session down.
    async fn disconnect(&self) -> Result<(), DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_from_yaml_number() {
        let qos: QoS = serde_yaml::from_str("0").unwrap();
        assert_eq!(qos, QoS::AtMostOnce);
        let qos: QoS = serde_yaml::from_str("1").unwrap();
        assert_eq!(qos, QoS::AtLeastOnce);
        assert!(serde_yaml::from_str::<QoS>("2").is_err());
    }

    #[test]
    fn test_not_connected_message() {
        let err = DeliveryError::NotConnected(ConnectionStatus::ConnectionLost);
        assert_eq!(err.to_string(), "not connected (status: Connection lost)");
    }
}
