//! MQTT broker over TLS with mutual authentication.
//!
//! Each connect builds a fresh `rumqttc` client and spawns a task that drives
//! its event loop. The task translates transport events into [`BrokerEvent`]s
//! and paces reconnects with [`Backoff`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet,
    TlsConfiguration, Transport,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::delivery::backoff::Backoff;
use crate::delivery::broker::{Broker, DeliveryError, QoS};
use crate::delivery::connection::{DEFAULT_PUBLISH_TIMEOUT, DEFAULT_TOPIC, DeliveryConfig};
use crate::delivery::credentials::Keystore;
use crate::delivery::status::{BrokerEvent, StatusReporter};

/// Default MQTT over TLS port.
pub const DEFAULT_PORT: u16 = 8883;

/// Upper bound for the reconnect delay.
pub const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(60);

/// How long `disconnect` waits for the event loop to flush the DISCONNECT.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(30)
}

fn default_publish_timeout() -> Duration {
    DEFAULT_PUBLISH_TIMEOUT
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_reconnect_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_channel_capacity() -> usize {
    10
}

/// Broker endpoint and session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host name.
    pub endpoint: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// MQTT client id; empty means "use the device id".
    #[serde(default)]
    pub client_id: String,

    /// Topic receiving metric payloads.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// 0 (at most once) or 1 (at least once).
    #[serde(default)]
    pub qos: QoS,

    #[serde(default = "default_keep_alive", with = "humantime_serde")]
    pub keep_alive: Duration,

    #[serde(default = "default_publish_timeout", with = "humantime_serde")]
    pub publish_timeout: Duration,

    /// Consecutive transport failures tolerated before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Initial reconnect delay, doubled per failure.
    #[serde(default = "default_reconnect_backoff", with = "humantime_serde")]
    pub reconnect_backoff: Duration,

    /// Request queue depth between client and event loop.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl MqttConfig {
    pub fn new(endpoint: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            port: DEFAULT_PORT,
            client_id: client_id.into(),
            topic: default_topic(),
            qos: QoS::default(),
            keep_alive: default_keep_alive(),
            publish_timeout: default_publish_timeout(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_backoff: default_reconnect_backoff(),
            channel_capacity: default_channel_capacity(),
        }
    }

    /// Publish settings for the delivery connection.
    pub fn delivery(&self) -> DeliveryConfig {
        DeliveryConfig {
            topic: self.topic.clone(),
            qos: self.qos,
            publish_timeout: self.publish_timeout,
        }
    }

    fn options(&self, keystore: &Keystore) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.endpoint, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
            ca: keystore.root_ca_pem().to_vec(),
            alpn: None,
            client_auth: Some((
                keystore.client_cert_pem().to_vec(),
                keystore.private_key_pem().to_vec(),
            )),
        }));
        options
    }
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        }
    }
}

struct Session {
    client: AsyncClient,
    closing: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// `rumqttc` backed [`Broker`].
pub struct MqttBroker {
    config: MqttConfig,
    session: Mutex<Option<Session>>,
}

impl std::fmt::Debug for MqttBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBroker")
            .field("endpoint", &self.config.endpoint)
            .field("port", &self.config.port)
            .field("client_id", &self.config.client_id)
            .finish_non_exhaustive()
    }
}

impl MqttBroker {
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl Broker for MqttBroker {
    async fn connect(
        &self,
        keystore: Arc<Keystore>,
        reporter: StatusReporter,
    ) -> Result<(), DeliveryError> {
        let mut session = self.session.lock().await;
        if let Some(old) = session.take() {
            old.closing.store(true, Ordering::SeqCst);
            old.task.abort();
        }

        let (client, eventloop) =
            AsyncClient::new(self.config.options(&keystore), self.config.channel_capacity);
        let closing = Arc::new(AtomicBool::new(false));
        let backoff = Backoff::new(self.config.reconnect_backoff, MAX_RECONNECT_BACKOFF);
        let task = tokio::spawn(drive(
            eventloop,
            reporter,
            backoff,
            self.config.max_reconnect_attempts,
            Arc::clone(&closing),
        ));

        tracing::debug!(
            endpoint = %self.config.endpoint,
            port = self.config.port,
            client_id = %self.config.client_id,
            "MQTT event loop started"
        );
        *session = Some(Session {
            client,
            closing,
            task,
        });
        Ok(())
    }

    /// Hands the publish to the client's request queue. `Ok` means queued:
    /// the event loop writes it later and a QoS 1 PubAck is never awaited. A
    /// full queue blocks here, which the caller's publish timeout bounds.
    async fn publish(&self, payload: Vec<u8>, topic: &str, qos: QoS) -> Result<(), DeliveryError> {
        let client = {
            let session = self.session.lock().await;
            match session.as_ref() {
                Some(s) => s.client.clone(),
                None => return Err(DeliveryError::Transport("no active session".to_string())),
            }
        };
        client
            .publish(topic, qos.into(), false, payload)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), DeliveryError> {
        let Some(mut session) = self.session.lock().await.take() else {
            return Ok(());
        };
        session.closing.store(true, Ordering::SeqCst);
        // A stalled event loop leaves the queue full; do not wait on it.
        let result = session
            .client
            .try_disconnect()
            .map_err(|e| DeliveryError::Transport(e.to_string()));

        if tokio::time::timeout(DISCONNECT_GRACE, &mut session.task)
            .await
            .is_err()
        {
            tracing::debug!("MQTT event loop did not stop in time, aborting");
            session.task.abort();
        }
        result
    }
}

/// Poll the event loop until the session closes or fails for good.
async fn drive(
    mut eventloop: EventLoop,
    reporter: StatusReporter,
    mut backoff: Backoff,
    max_attempts: u32,
    closing: Arc<AtomicBool>,
) {
    let mut acknowledged = false;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    reporter.report(BrokerEvent::Fatal(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )));
                    return;
                }
                backoff.mark_success();
                let event = if acknowledged {
                    BrokerEvent::Resumed
                } else {
                    BrokerEvent::Acknowledged
                };
                acknowledged = true;
                reporter.report(event);
            }
            Ok(_) => {}
            Err(e) if closing.load(Ordering::SeqCst) => {
                tracing::debug!(error = %e, "MQTT event loop closed");
                return;
            }
            Err(ConnectionError::Tls(e)) => {
                reporter.report(BrokerEvent::Fatal(format!("tls failure: {e}")));
                return;
            }
            Err(ConnectionError::ConnectionRefused(code)) => {
                reporter.report(BrokerEvent::Fatal(format!(
                    "broker refused connection: {code:?}"
                )));
                return;
            }
            Err(e) => {
                if acknowledged {
                    reporter.report(BrokerEvent::Interrupted);
                }
                let delay = backoff.mark_failure();
                if backoff.failures() >= max_attempts {
                    tracing::warn!(
                        error = %e,
                        attempts = backoff.failures(),
                        "Giving up on broker connection"
                    );
                    reporter.report(BrokerEvent::ResumeFailed);
                    return;
                }
                tracing::warn!(
                    error = %e,
                    attempt = backoff.failures(),
                    delay_ms = delay.as_millis() as u64,
                    "Broker connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_yaml() {
        let config: MqttConfig = serde_yaml::from_str("endpoint: iot.example.com").unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.topic, DEFAULT_TOPIC);
        assert_eq!(config.qos, QoS::AtLeastOnce);
        assert_eq!(config.publish_timeout, Duration::from_secs(10));
        assert!(config.client_id.is_empty());
    }

    #[test]
    fn test_config_overrides() {
        let yaml = r#"
endpoint: iot.example.com
port: 443
qos: 0
keep_alive: 1m
reconnect_backoff: 500ms
"#;
        let config: MqttConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.port, 443);
        assert_eq!(config.qos, QoS::AtMostOnce);
        assert_eq!(config.keep_alive, Duration::from_secs(60));
        assert_eq!(config.reconnect_backoff, Duration::from_millis(500));

        let delivery = config.delivery();
        assert_eq!(delivery.qos, QoS::AtMostOnce);
        assert_eq!(delivery.topic, DEFAULT_TOPIC);
    }

    /// Session whose event loop is never polled, so requests only queue.
    async fn idle_session(broker: &MqttBroker, capacity: usize) -> EventLoop {
        let options = MqttOptions::new("device-1", "localhost", DEFAULT_PORT);
        let (client, eventloop) = AsyncClient::new(options, capacity);
        *broker.session.lock().await = Some(Session {
            client,
            closing: Arc::new(AtomicBool::new(false)),
            task: tokio::spawn(std::future::pending::<()>()),
        });
        eventloop
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_returns_once_queued() {
        let broker = MqttBroker::new(MqttConfig::new("localhost", "device-1"));
        let _eventloop = idle_session(&broker, 1).await;

        // Nothing reaches a broker, yet the hand-off succeeds.
        broker
            .publish(b"{}".to_vec(), DEFAULT_TOPIC, QoS::AtLeastOnce)
            .await
            .unwrap();

        // With the queue full the next publish waits; only a timeout ends it.
        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            broker.publish(b"{}".to_vec(), DEFAULT_TOPIC, QoS::AtLeastOnce),
        )
        .await;
        assert!(blocked.is_err());

        // Disconnect does not hang behind the full queue.
        let closed = tokio::time::timeout(DISCONNECT_GRACE * 2, broker.disconnect()).await;
        assert!(closed.is_ok());
        assert!(broker.session.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_publish_without_session_fails() {
        let broker = MqttBroker::new(MqttConfig::new("localhost", "device-1"));
        let err = broker
            .publish(b"{}".to_vec(), DEFAULT_TOPIC, QoS::AtLeastOnce)
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
        broker.disconnect().await.unwrap();
    }
}
