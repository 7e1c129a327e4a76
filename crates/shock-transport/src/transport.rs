//! Physical channel contract.
//!
//! A [`Transport`] moves named JSON events over one connection and reports
//! lifecycle changes on the [`TransportEvent`] receiver handed out by its
//! [`TransportFactory`]. It knows nothing about encryption or subscriptions.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use shock_core::TransportError;
use tokio::sync::mpsc;

/// Why a channel went down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the channel on purpose. The only reason the event
    /// socket reconnects on its own.
    ServerDisconnect,
    /// This side called [`Transport::disconnect`].
    ClientDisconnect,
    /// The underlying stream ended without a close handshake.
    TransportClose,
    /// The underlying stream failed.
    TransportError,
}

impl DisconnectReason {
    /// Wire-style name, as delivered to `disconnect` handlers.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServerDisconnect => "io server disconnect",
            Self::ClientDisconnect => "io client disconnect",
            Self::TransportClose => "transport close",
            Self::TransportError => "transport error",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened on a physical channel.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// The channel is up.
    Connected,
    /// The channel went down.
    Disconnected(DisconnectReason),
    /// A named event arrived.
    Message {
        /// Event name.
        event: String,
        /// Raw payload as received.
        data: Value,
    },
    /// A non-fatal error; the channel may or may not still be up.
    Error(String),
}

/// Receiver side of a transport's event stream.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// One physical bidirectional event channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection. Emits [`TransportEvent::Connected`] on
    /// success. Connecting an already connected channel is a no-op.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Close the connection. Emits
    /// [`TransportEvent::Disconnected`]`(ClientDisconnect)` when it was up.
    async fn disconnect(&self);

    /// Live connection state.
    fn is_connected(&self) -> bool;

    /// Send one named event.
    async fn send(&self, event: &str, data: &Value) -> Result<(), TransportError>;
}

// Test-only Debug so `assert_matches!` can format `Result<Box<dyn Transport>, _>`.
#[cfg(test)]
impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Transport")
    }
}

/// Creates transports for endpoint URLs.
pub trait TransportFactory: Send + Sync {
    /// Create an unconnected transport for `url` and its event stream.
    fn open(&self, url: &str) -> Result<(Arc<dyn Transport>, TransportEvents), TransportError>;
}
