//! In-memory transport doubles.
//!
//! [`MockTransport`] records every frame sent through it and lets a test play
//! the server: connect, disconnect with a reason, push events, raise errors.
//! [`MockTransportFactory`] keeps every transport it opened so tests can
//! reach the channel a component created internally.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use shock_core::TransportError;
use tokio::sync::mpsc;

use crate::transport::{
    DisconnectReason, Transport, TransportEvent, TransportEvents, TransportFactory,
};

/// Scriptable in-memory [`Transport`].
pub struct MockTransport {
    url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    connected: AtomicBool,
    auto_connect: bool,
    fail_connect: AtomicBool,
    sent: Mutex<Vec<(String, Value)>>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
}

impl MockTransport {
    /// Transport whose `connect()` succeeds immediately.
    pub fn new(url: impl Into<String>) -> (Arc<Self>, TransportEvents) {
        Self::build(url.into(), true)
    }

    /// Transport whose `connect()` leaves it pending until
    /// [`server_connect`](Self::server_connect) is called.
    pub fn manual(url: impl Into<String>) -> (Arc<Self>, TransportEvents) {
        Self::build(url.into(), false)
    }

    fn build(url: String, auto_connect: bool) -> (Arc<Self>, TransportEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            url,
            events,
            connected: AtomicBool::new(false),
            auto_connect,
            fail_connect: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
        });
        (transport, rx)
    }

    /// URL this transport was opened for.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make subsequent `connect()` calls fail.
    pub fn fail_connects(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Server accepts the connection.
    pub fn server_connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Connected);
    }

    /// Channel goes down for `reason`.
    pub fn server_disconnect(&self, reason: DisconnectReason) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Disconnected(reason));
    }

    /// Server pushes `event` with raw `data`.
    pub fn inject(&self, event: &str, data: Value) {
        let _ = self.events.send(TransportEvent::Message {
            event: event.to_owned(),
            data,
        });
    }

    /// Channel reports a non-fatal error.
    pub fn inject_error(&self, message: &str) {
        let _ = self.events.send(TransportEvent::Error(message.to_owned()));
    }

    /// Every frame sent so far, in order.
    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().clone()
    }

    /// Payloads sent for `event`, in order.
    pub fn sent_to(&self, event: &str) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Forget recorded frames.
    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    /// Number of `connect()` calls.
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of `disconnect()` calls.
    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let _ = self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".into()));
        }
        if self.auto_connect && !self.connected.load(Ordering::SeqCst) {
            self.server_connect();
        }
        Ok(())
    }

    async fn disconnect(&self) {
        let _ = self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self
                .events
                .send(TransportEvent::Disconnected(DisconnectReason::ClientDisconnect));
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, event: &str, data: &Value) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push((event.to_owned(), data.clone()));
        Ok(())
    }
}

/// [`TransportFactory`] producing [`MockTransport`]s.
pub struct MockTransportFactory {
    auto_connect: bool,
    fail_connect: AtomicBool,
    opened: Mutex<Vec<Arc<MockTransport>>>,
}

impl Default for MockTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransportFactory {
    /// Factory whose transports connect immediately.
    pub fn new() -> Self {
        Self {
            auto_connect: true,
            fail_connect: AtomicBool::new(false),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Factory whose transports wait for `server_connect()`.
    pub fn manual() -> Self {
        Self {
            auto_connect: false,
            ..Self::new()
        }
    }

    /// Make transports opened from now on refuse to connect.
    pub fn fail_connects(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Every transport opened so far, oldest first.
    pub fn opened(&self) -> Vec<Arc<MockTransport>> {
        self.opened.lock().clone()
    }

    /// The most recently opened transport.
    pub fn last(&self) -> Option<Arc<MockTransport>> {
        self.opened.lock().last().cloned()
    }
}

impl TransportFactory for MockTransportFactory {
    fn open(&self, url: &str) -> Result<(Arc<dyn Transport>, TransportEvents), TransportError> {
        let (transport, events) = MockTransport::build(url.to_owned(), self.auto_connect);
        transport.fail_connects(self.fail_connect.load(Ordering::SeqCst));
        self.opened.lock().push(transport.clone());
        let transport: Arc<dyn Transport> = transport;
        Ok((transport, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[tokio::test]
    async fn records_sent_frames_when_connected() {
        let (t, mut events) = MockTransport::new("ws://mock/");
        assert_matches!(t.send("A", &json!(1)).await, Err(TransportError::NotConnected));
        t.connect().await.unwrap();
        assert_eq!(events.recv().await, Some(TransportEvent::Connected));
        t.send("A", &json!(1)).await.unwrap();
        t.send("B", &json!(2)).await.unwrap();
        assert_eq!(t.sent_to("A"), vec![json!(1)]);
        assert_eq!(t.sent().len(), 2);
    }

    #[tokio::test]
    async fn manual_transport_waits_for_server() {
        let (t, _events) = MockTransport::manual("ws://mock/");
        t.connect().await.unwrap();
        assert!(!t.is_connected());
        t.server_connect();
        assert!(t.is_connected());
    }

    #[tokio::test]
    async fn client_disconnect_reports_reason_once() {
        let (t, mut events) = MockTransport::new("ws://mock/");
        t.connect().await.unwrap();
        t.disconnect().await;
        t.disconnect().await;
        assert_eq!(events.recv().await, Some(TransportEvent::Connected));
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Disconnected(DisconnectReason::ClientDisconnect))
        );
        assert!(events.try_recv().is_err());
        assert_eq!(t.disconnect_calls(), 2);
    }

    #[test]
    fn factory_keeps_opened_transports() {
        let factory = MockTransportFactory::new();
        let _ = factory.open("ws://a/").unwrap();
        let _ = factory.open("ws://b/").unwrap();
        assert_eq!(factory.opened().len(), 2);
        assert_eq!(factory.last().unwrap().url(), "ws://b/");
    }
}
