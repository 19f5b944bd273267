//! Connection owner: keystore bootstrap, connect, publish, disconnect.

use std::sync::Arc;
use std::time::Duration;

use crate::delivery::broker::{Broker, DeliveryError, QoS};
use crate::delivery::credentials::CredentialStore;
use crate::delivery::status::{BrokerEvent, ConnectionStatus, StatusReceiver, StatusReporter};

/// Default topic for metric payloads.
pub const DEFAULT_TOPIC: &str = "device/metrics/data";

/// Default bound on a single publish.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Publish settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    pub topic: String,
    pub qos: QoS,
    pub publish_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            qos: QoS::default(),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}

/// Owns the broker session and its status.
///
/// The status is written only by the [`StatusReporter`] shared with the
/// broker; everything else observes it.
pub struct DeliveryConnection {
    broker: Arc<dyn Broker>,
    credentials: Arc<CredentialStore>,
    reporter: StatusReporter,
    config: DeliveryConfig,
}

impl std::fmt::Debug for DeliveryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryConnection")
            .field("status", &self.status())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DeliveryConnection {
    pub fn new(
        broker: Arc<dyn Broker>,
        credentials: Arc<CredentialStore>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            broker,
            credentials,
            reporter: StatusReporter::new(),
            config,
        }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.reporter.current()
    }

    /// Observe status changes.
    pub fn subscribe(&self) -> StatusReceiver {
        self.reporter.subscribe()
    }

    /// Ensure credentials and issue a broker connect.
    ///
    /// Returns as soon as the connect is issued; `Connected` arrives later
    /// through the status channel. A no-op while a session is already live or
    /// being established. A transport `Error` is retried; a cached credential
    /// failure is returned without touching the broker.
    pub async fn connect(&self) -> Result<(), DeliveryError> {
        let status = self.status();
        if !status.can_connect() {
            tracing::debug!(status = %status, "Connect ignored, session already active");
            return Ok(());
        }

        let keystore = match self.credentials.ensure_credentials().await {
            Ok(keystore) => keystore,
            Err(e) => {
                self.reporter
                    .report(BrokerEvent::Fatal(format!("credentials unavailable: {e}")));
                return Err(e.into());
            }
        };

        if self.reporter.report(BrokerEvent::ConnectRequested).is_none() {
            // Another caller won the race.
            return Ok(());
        }

        tracing::info!(topic = %self.config.topic, "Connecting to broker");
        if let Err(e) = self.broker.connect(keystore, self.reporter.clone()).await {
            tracing::error!(error = %e, "Broker connect failed");
            self.reporter.report(BrokerEvent::Fatal(e.to_string()));
            return Err(e);
        }
        Ok(())
    }

    /// Publish a serialized snapshot. Only valid while `Connected`.
    pub async fn publish(&self, payload: Vec<u8>) -> Result<(), DeliveryError> {
        let status = self.status();
        if !status.is_connected() {
            return Err(DeliveryError::NotConnected(status));
        }

        let timeout = self.config.publish_timeout;
        let publish = self
            .broker
            .publish(payload, &self.config.topic, self.config.qos);
        match tokio::time::timeout(timeout, publish).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(timeout)),
        }
    }

    /// Close the session, including one still waiting for its first
    /// acknowledgment. A no-op when no session exists.
    pub async fn disconnect(&self) -> Result<(), DeliveryError> {
        let status = self.status();
        if !matches!(
            status,
            ConnectionStatus::Connecting
                | ConnectionStatus::Connected
                | ConnectionStatus::Reconnecting
        ) {
            tracing::debug!(status = %status, "Disconnect ignored");
            return Ok(());
        }

        let result = self.broker.disconnect().await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Broker disconnect reported an error");
        }
        self.reporter.report(BrokerEvent::Closed);
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::delivery::credentials::Keystore;
    use crate::delivery::credentials::tests::provisioned;
    use crate::delivery::credentials::CredentialConfig;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// In-memory broker. Acknowledges connects immediately when `auto_ack`.
    #[derive(Default)]
    pub(crate) struct MockBroker {
        pub auto_ack: bool,
        pub fail_publish: AtomicBool,
        pub publish_delay: Option<Duration>,
        pub connects: AtomicUsize,
        pub disconnects: AtomicUsize,
        pub published: Mutex<Vec<(Vec<u8>, String, QoS)>>,
        pub reporter: Mutex<Option<StatusReporter>>,
    }

    impl MockBroker {
        pub(crate) fn acking() -> Self {
            Self {
                auto_ack: true,
                ..Self::default()
            }
        }

        /// Deliver an event as the transport would.
        pub(crate) fn emit(&self, event: BrokerEvent) {
            if let Some(reporter) = self.reporter.lock().unwrap().as_ref() {
                reporter.report(event);
            }
        }

        pub(crate) fn published_count(&self) -> usize {
            self.published.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl Broker for MockBroker {
        async fn connect(
            &self,
            _keystore: Arc<Keystore>,
            reporter: StatusReporter,
        ) -> Result<(), DeliveryError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.auto_ack {
                reporter.report(BrokerEvent::Acknowledged);
            }
            *self.reporter.lock().unwrap() = Some(reporter);
            Ok(())
        }

        async fn publish(
            &self,
            payload: Vec<u8>,
            topic: &str,
            qos: QoS,
        ) -> Result<(), DeliveryError> {
            if let Some(delay) = self.publish_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err(DeliveryError::Transport("broker rejected publish".to_string()));
            }
            self.published
                .lock()
                .unwrap()
                .push((payload, topic.to_string(), qos));
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), DeliveryError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn connection(broker: Arc<MockBroker>, credentials: CredentialConfig) -> DeliveryConnection {
        DeliveryConnection::new(
            broker,
            Arc::new(CredentialStore::new(credentials)),
            DeliveryConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_connect_then_publish() {
        let dir = tempdir().unwrap();
        let broker = Arc::new(MockBroker::acking());
        let conn = connection(Arc::clone(&broker), provisioned(&dir));

        conn.connect().await.unwrap();
        assert_eq!(conn.status(), ConnectionStatus::Connected);

        conn.publish(b"{}".to_vec()).await.unwrap();
        let published = broker.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1, DEFAULT_TOPIC);
        assert_eq!(published[0].2, QoS::AtLeastOnce);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_while_active() {
        let dir = tempdir().unwrap();
        let broker = Arc::new(MockBroker::default());
        let conn = connection(Arc::clone(&broker), provisioned(&dir));

        conn.connect().await.unwrap();
        assert_eq!(conn.status(), ConnectionStatus::Connecting);
        conn.connect().await.unwrap();
        assert_eq!(broker.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_publish_refused_unless_connected() {
        let dir = tempdir().unwrap();
        let broker = Arc::new(MockBroker::default());
        let conn = connection(Arc::clone(&broker), provisioned(&dir));

        let err = conn.publish(b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::NotConnected(ConnectionStatus::Disconnected)
        ));

        conn.connect().await.unwrap();
        let err = conn.publish(b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::NotConnected(ConnectionStatus::Connecting)
        ));
        assert_eq!(broker.published_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_credentials_set_error() {
        let dir = tempdir().unwrap();
        let broker = Arc::new(MockBroker::acking());
        let conn = connection(
            Arc::clone(&broker),
            CredentialConfig::new(dir.path().join("nothing"), dir.path().join("private")),
        );

        let err = conn.connect().await.unwrap_err();
        assert!(matches!(err, DeliveryError::Credential(_)));
        assert!(matches!(conn.status(), ConnectionStatus::Error(_)));
        assert_eq!(broker.connects.load(Ordering::SeqCst), 0);

        // The cached credential failure keeps refusing, without a broker call.
        let err = conn.connect().await.unwrap_err();
        assert!(matches!(err, DeliveryError::Credential(_)));
        assert!(conn.credentials.failure().await.is_some());
        assert_eq!(broker.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reconnect_after_transport_error() {
        let dir = tempdir().unwrap();
        let broker = Arc::new(MockBroker::default());
        let conn = connection(Arc::clone(&broker), provisioned(&dir));

        // Retries run out before the broker ever acknowledges.
        conn.connect().await.unwrap();
        broker.emit(BrokerEvent::ResumeFailed);
        assert!(matches!(conn.status(), ConnectionStatus::Error(_)));

        conn.connect().await.unwrap();
        assert_eq!(conn.status(), ConnectionStatus::Connecting);
        assert_eq!(broker.connects.load(Ordering::SeqCst), 2);

        // A fatal transport failure is retried the same way.
        broker.emit(BrokerEvent::Fatal("tls handshake failed".to_string()));
        conn.connect().await.unwrap();
        broker.emit(BrokerEvent::Acknowledged);
        assert_eq!(conn.status(), ConnectionStatus::Connected);
        assert_eq!(broker.connects.load(Ordering::SeqCst), 3);
        assert!(conn.credentials.failure().await.is_none());
    }

    #[tokio::test]
    async fn test_reconnect_after_connection_lost() {
        let dir = tempdir().unwrap();
        let broker = Arc::new(MockBroker::acking());
        let conn = connection(Arc::clone(&broker), provisioned(&dir));

        conn.connect().await.unwrap();
        broker.emit(BrokerEvent::Interrupted);
        assert_eq!(conn.status(), ConnectionStatus::Reconnecting);
        assert!(conn.publish(b"{}".to_vec()).await.is_err());
        broker.emit(BrokerEvent::ResumeFailed);
        assert_eq!(conn.status(), ConnectionStatus::ConnectionLost);

        conn.connect().await.unwrap();
        assert_eq!(conn.status(), ConnectionStatus::Connected);
        assert_eq!(broker.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_timeout() {
        let dir = tempdir().unwrap();
        let broker = Arc::new(MockBroker {
            auto_ack: true,
            publish_delay: Some(Duration::from_secs(60)),
            ..MockBroker::default()
        });
        let conn = connection(Arc::clone(&broker), provisioned(&dir));
        conn.connect().await.unwrap();

        let err = conn.publish(b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Timeout(d) if d == DEFAULT_PUBLISH_TIMEOUT));
    }

    #[tokio::test]
    async fn test_disconnect() {
        let dir = tempdir().unwrap();
        let broker = Arc::new(MockBroker::acking());
        let conn = connection(Arc::clone(&broker), provisioned(&dir));

        // Nothing to close yet.
        conn.disconnect().await.unwrap();
        assert_eq!(broker.disconnects.load(Ordering::SeqCst), 0);

        conn.connect().await.unwrap();
        conn.disconnect().await.unwrap();
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
        assert_eq!(broker.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_while_connecting() {
        let dir = tempdir().unwrap();
        let broker = Arc::new(MockBroker::default());
        let conn = connection(Arc::clone(&broker), provisioned(&dir));

        conn.connect().await.unwrap();
        assert_eq!(conn.status(), ConnectionStatus::Connecting);

        conn.disconnect().await.unwrap();
        assert_eq!(broker.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);

        // The torn-down session's acknowledgment arrives too late.
        broker.emit(BrokerEvent::Acknowledged);
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
    }
}
