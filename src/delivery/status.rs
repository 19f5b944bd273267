//! Connection status state machine.
//!
//! ```text
//! Disconnected | ConnectionLost | Error --ConnectRequested--> Connecting
//! Connecting --Acknowledged--> Connected
//! Connected --Interrupted--> Reconnecting --Resumed--> Connected
//! Reconnecting --ResumeFailed--> ConnectionLost
//! any --Fatal(msg)--> Error(msg)
//! Connecting | Connected | Reconnecting --Closed--> Disconnected
//! ```
//!
//! `Error` accepts a fresh connect request. Whether one is issued is decided
//! by the connection owner: a cached credential failure refuses it.
//!
//! The current status lives in a `watch` channel. All writes go through
//! [`StatusReporter::report`], which applies the transition under the
//! channel's lock, so readers never observe a torn value.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

/// Broker connection status.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    ConnectionLost,
    /// Transport or credential failure that ended the session.
    Error(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether a new connect request is allowed from this state.
    pub fn can_connect(&self) -> bool {
        matches!(
            self,
            Self::Disconnected | Self::ConnectionLost | Self::Error(_)
        )
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => f.write_str("Disconnected"),
            Self::Connecting => f.write_str("Connecting"),
            Self::Connected => f.write_str("Connected"),
            Self::Reconnecting => f.write_str("Reconnecting"),
            Self::ConnectionLost => f.write_str("Connection lost"),
            Self::Error(msg) => write!(f, "Error: {msg}"),
        }
    }
}

/// Events reported by the connection owner and the broker transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// A connect was issued.
    ConnectRequested,
    /// The broker acknowledged the session.
    Acknowledged,
    /// The transport dropped; the client is retrying.
    Interrupted,
    /// The transport came back after an interruption.
    Resumed,
    /// Retries were exhausted.
    ResumeFailed,
    /// Unrecoverable failure.
    Fatal(String),
    /// Explicit teardown completed.
    Closed,
}

/// Next status for `event` in `current`, or `None` if the event does not
/// apply in that state.
pub fn transition(current: &ConnectionStatus, event: &BrokerEvent) -> Option<ConnectionStatus> {
    use BrokerEvent as E;
    use ConnectionStatus as S;

    match (current, event) {
        (_, E::Fatal(msg)) => Some(S::Error(msg.clone())),
        (S::Disconnected | S::ConnectionLost | S::Error(_), E::ConnectRequested) => {
            Some(S::Connecting)
        }
        (S::Connecting, E::Acknowledged) => Some(S::Connected),
        (S::Connected, E::Interrupted) => Some(S::Reconnecting),
        (S::Reconnecting, E::Resumed | E::Acknowledged) => Some(S::Connected),
        (S::Reconnecting, E::ResumeFailed) => Some(S::ConnectionLost),
        // Never acknowledged and out of retries: nothing to resume.
        (S::Connecting, E::ResumeFailed) => Some(S::Error(
            "connection attempts exhausted before broker acknowledgment".to_string(),
        )),
        (S::Connecting | S::Connected | S::Reconnecting, E::Closed) => Some(S::Disconnected),
        _ => None,
    }
}

/// Subscriber side of the status channel.
pub type StatusReceiver = watch::Receiver<ConnectionStatus>;

/// Writer side of the status channel, handed to the broker as its callback.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: Arc<watch::Sender<ConnectionStatus>>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self { tx: Arc::new(tx) }
    }

    /// Apply `event` atomically. Returns the new status if it changed.
    pub fn report(&self, event: BrokerEvent) -> Option<ConnectionStatus> {
        let mut applied = None;
        self.tx.send_if_modified(|status| match transition(status, &event) {
            Some(next) if next != *status => {
                tracing::info!(from = %status, to = %next, event = ?event, "Connection status changed");
                *status = next.clone();
                applied = Some(next);
                true
            }
            Some(_) => false,
            None => {
                tracing::debug!(status = %status, event = ?event, "Ignoring event in current state");
                false
            }
        });
        applied
    }

    /// Current status.
    pub fn current(&self) -> ConnectionStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> StatusReceiver {
        self.tx.subscribe()
    }
}
