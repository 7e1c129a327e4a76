//! The encrypting event socket.
//!
//! [`EventSocket`] wraps one [`Transport`] and is the single point of truth
//! for its connectivity. Outgoing payloads pass through
//! [`SessionCipher::prepare_outgoing`]; incoming payloads are resolved once by
//! a dispatcher task and then handed to every handler registered for the
//! event, in registration order. Handlers never see raw envelopes.
//!
//! Lifecycle changes are delivered as the `connect` (payload `null`) and
//! `disconnect` (payload: reason string) events. After a
//! [`DisconnectReason::ServerDisconnect`] the socket makes one reconnect
//! attempt on its own. A failed attempt is logged and not retried; recovery
//! from it, and from any other disconnect, is left to the owner (the
//! liveness watchdog or the caller).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use shock_core::{ShockError, TransportError};
use shock_crypto::SessionCipher;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::transport::{
    DisconnectReason, Transport, TransportEvent, TransportEvents, TransportFactory,
};

/// Event delivered when the channel comes up.
pub const CONNECT_EVENT: &str = "connect";
/// Event delivered when the channel goes down.
pub const DISCONNECT_EVENT: &str = "disconnect";

/// Async event handler.
pub type EventHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

struct SocketShared {
    transport: Arc<dyn Transport>,
    cipher: Arc<SessionCipher>,
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
    connect_waiters: Mutex<Vec<oneshot::Sender<()>>>,
}

impl SocketShared {
    async fn deliver(&self, event: &str, data: Value) {
        let handlers = self.handlers.read().get(event).cloned().unwrap_or_default();
        if handlers.is_empty() {
            trace!(event, "no handlers");
            return;
        }
        for handler in handlers {
            handler(data.clone()).await;
        }
    }

    fn release_connect_waiters(&self) {
        let waiters = std::mem::take(&mut *self.connect_waiters.lock());
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}

/// One logical, encrypted, bidirectional event channel.
pub struct EventSocket {
    shared: Arc<SocketShared>,
    cancel: CancellationToken,
}

impl EventSocket {
    /// Open an unconnected socket to `url`.
    pub fn open(
        factory: &dyn TransportFactory,
        url: &str,
        cipher: Arc<SessionCipher>,
    ) -> Result<Self, TransportError> {
        let (transport, events) = factory.open(url)?;
        Ok(Self::with_transport(transport, events, cipher))
    }

    /// Wrap an existing transport and its event stream.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        events: TransportEvents,
        cipher: Arc<SessionCipher>,
    ) -> Self {
        let shared = Arc::new(SocketShared {
            transport,
            cipher,
            handlers: RwLock::new(HashMap::new()),
            connect_waiters: Mutex::new(Vec::new()),
        });
        let cancel = CancellationToken::new();
        let _ = tokio::spawn(dispatch(shared.clone(), events, cancel.clone()));
        Self { shared, cancel }
    }

    /// Establish the underlying connection.
    pub async fn connect(&self) -> Result<(), ShockError> {
        self.shared.transport.connect().await?;
        Ok(())
    }

    /// Close the underlying connection. Handlers stay registered.
    pub async fn disconnect(&self) {
        self.shared.transport.disconnect().await;
    }

    /// Remove every handler, close the connection and stop dispatching.
    pub async fn close(&self) {
        self.off_all();
        self.shared.transport.disconnect().await;
        self.cancel.cancel();
    }

    /// Live connection state of the underlying transport.
    pub fn connected(&self) -> bool {
        self.shared.transport.is_connected()
    }

    /// Negation of [`connected`](Self::connected).
    pub fn disconnected(&self) -> bool {
        !self.connected()
    }

    /// The encryption gate this socket applies.
    pub fn cipher(&self) -> &Arc<SessionCipher> {
        &self.shared.cipher
    }

    /// Register `handler` for `event`.
    pub fn on<F, Fut>(&self, event: &str, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |data| Box::pin(handler(data)));
        self.shared
            .handlers
            .write()
            .entry(event.to_owned())
            .or_default()
            .push(handler);
    }

    /// Remove every handler for `event`.
    pub fn off(&self, event: &str) {
        let _ = self.shared.handlers.write().remove(event);
    }

    /// Remove every handler for every event.
    pub fn off_all(&self) {
        self.shared.handlers.write().clear();
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.shared.handlers.read().get(event).map_or(0, Vec::len)
    }

    /// One-shot signal fired after the next `connect` has been delivered.
    ///
    /// Waiters whose receiver is gone are pruned on every call.
    pub fn connect_signal(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.shared.connect_waiters.lock();
        waiters.retain(|waiter| !waiter.is_closed());
        waiters.push(tx);
        rx
    }

    /// Number of live [`connect_signal`](Self::connect_signal) waiters.
    pub fn connect_waiter_count(&self) -> usize {
        self.shared
            .connect_waiters
            .lock()
            .iter()
            .filter(|waiter| !waiter.is_closed())
            .count()
    }

    /// Prepare `payload` for `event` and send it.
    ///
    /// Fails with [`ShockError::MissingPeerKey`] when the payload needs
    /// encryption and no key has been exchanged; nothing is sent then.
    pub async fn emit(&self, event: &str, payload: Value) -> Result<(), ShockError> {
        let wire = self.shared.cipher.prepare_outgoing(event, payload).await?;
        self.shared.transport.send(event, &wire).await?;
        trace!(event, "emitted");
        Ok(())
    }
}

impl Drop for EventSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn dispatch(shared: Arc<SocketShared>, mut events: TransportEvents, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            TransportEvent::Connected => {
                debug!("socket connected");
                shared.deliver(CONNECT_EVENT, Value::Null).await;
                shared.release_connect_waiters();
            }
            TransportEvent::Disconnected(reason) => {
                info!(%reason, "socket disconnected");
                shared
                    .deliver(DISCONNECT_EVENT, Value::String(reason.as_str().to_owned()))
                    .await;
                if reason == DisconnectReason::ServerDisconnect {
                    let transport = shared.transport.clone();
                    let _ = tokio::spawn(async move {
                        if let Err(e) = transport.connect().await {
                            warn!(error = %e, "reconnect after server disconnect failed");
                        }
                    });
                }
            }
            TransportEvent::Message { event, data } => {
                match shared.cipher.resolve_incoming(&event, data).await {
                    Ok(data) => shared.deliver(&event, data).await,
                    Err(e) => warn!(event = %event, error = %e, "dropping event that failed to decrypt"),
                }
            }
            TransportEvent::Error(e) => warn!(error = %e, "transport error"),
        }
    }
    debug!("socket dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockTransport;
    use assert_matches::assert_matches;
    use serde_json::json;
    use shock_crypto::{EncryptionPolicy, HybridCipher, SessionCryptoContext};

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn plain_cipher() -> Arc<SessionCipher> {
        Arc::new(SessionCipher::new(
            Arc::new(HybridCipher::new()),
            Arc::new(SessionCryptoContext::new()),
            EncryptionPolicy::default(),
        ))
    }

    fn loopback_cipher() -> Arc<SessionCipher> {
        let hybrid = Arc::new(HybridCipher::new());
        let public = hybrid.generate_session_key("s");
        Arc::new(SessionCipher::new(
            hybrid,
            Arc::new(SessionCryptoContext::with_session(public.to_vec(), "s")),
            EncryptionPolicy::default(),
        ))
    }

    fn socket(cipher: Arc<SessionCipher>) -> (EventSocket, Arc<MockTransport>) {
        let (mock, events) = MockTransport::new("ws://mock/");
        let socket = EventSocket::with_transport(mock.clone(), events, cipher);
        (socket, mock)
    }

    fn recorder(socket: &EventSocket, event: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        socket.on(event, move |data| {
            let sink = sink.clone();
            async move { sink.lock().push(data) }
        });
        seen
    }

    #[tokio::test]
    async fn connected_reads_through_to_transport() {
        let (socket, mock) = socket(plain_cipher());
        assert!(socket.disconnected());
        socket.connect().await.unwrap();
        assert!(socket.connected());
        mock.server_disconnect(DisconnectReason::TransportClose);
        assert!(socket.disconnected());
    }

    #[tokio::test]
    async fn emit_without_peer_key_is_caller_visible() {
        let (socket, mock) = socket(plain_cipher());
        socket.connect().await.unwrap();
        let result = socket.emit("ON_CHATS", json!({"token": "t"})).await;
        assert_matches!(result, Err(ShockError::MissingPeerKey));
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn emit_when_disconnected_is_not_connected() {
        let (socket, _mock) = socket(plain_cipher());
        let result = socket.emit("IS_GUN_AUTH", json!({})).await;
        assert_matches!(
            result,
            Err(ShockError::Transport(TransportError::NotConnected))
        );
    }

    #[tokio::test]
    async fn encrypted_round_trip_reaches_handler_as_plaintext() {
        let cipher = loopback_cipher();
        let (socket, mock) = socket(cipher.clone());
        let seen = recorder(&socket, "ON_CHATS");
        socket.connect().await.unwrap();

        socket.emit("ON_CHATS", json!({"token": "t"})).await.unwrap();
        let wire = mock.sent_to("ON_CHATS").remove(0);
        assert!(wire.get("encryptedKey").is_some());

        mock.inject("ON_CHATS", wire);
        settle().await;
        assert_eq!(*seen.lock(), vec![json!({"token": "t"})]);
    }

    #[tokio::test]
    async fn undecryptable_event_is_dropped_and_logged() {
        let (logs, _guard) = shock_core::logging::capture_logs();
        let (socket, mock) = socket(plain_cipher());
        let seen = recorder(&socket, "ON_CHATS");
        let after = recorder(&socket, "ON_AVATAR");

        mock.inject(
            "ON_CHATS",
            json!({"encryptedKey": "AQ==", "encryptedData": "", "iv": ""}),
        );
        mock.inject("ON_AVATAR", json!({"ok": true, "msg": null}));
        settle().await;

        assert!(seen.lock().is_empty());
        assert_eq!(after.lock().len(), 1);
        assert!(logs.has_event(tracing::Level::WARN, "failed to decrypt"));
    }

    #[tokio::test]
    async fn delivery_follows_arrival_order() {
        let (socket, mock) = socket(loopback_cipher());
        let seen = recorder(&socket, "ON_CHATS");
        socket.connect().await.unwrap();

        for i in 0..5 {
            socket.emit("ON_CHATS", json!({"n": i})).await.unwrap();
        }
        for wire in mock.sent_to("ON_CHATS") {
            mock.inject("ON_CHATS", wire);
        }
        settle().await;

        let order: Vec<i64> = seen.lock().iter().filter_map(|v| v["n"].as_i64()).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let (socket, mock) = socket(plain_cipher());
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            socket.on("IS_GUN_AUTH", move |_| {
                let order = order.clone();
                async move { order.lock().push(tag) }
            });
        }
        mock.inject("IS_GUN_AUTH", json!(true));
        settle().await;
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn lifecycle_events_are_delivered() {
        let (socket, mock) = socket(plain_cipher());
        let connects = recorder(&socket, CONNECT_EVENT);
        let disconnects = recorder(&socket, DISCONNECT_EVENT);

        socket.connect().await.unwrap();
        mock.server_disconnect(DisconnectReason::TransportClose);
        settle().await;

        assert_eq!(*connects.lock(), vec![Value::Null]);
        assert_eq!(*disconnects.lock(), vec![json!("transport close")]);
    }

    #[tokio::test]
    async fn server_disconnect_reconnects() {
        let (socket, mock) = socket(plain_cipher());
        let connects = recorder(&socket, CONNECT_EVENT);
        socket.connect().await.unwrap();

        mock.server_disconnect(DisconnectReason::ServerDisconnect);
        settle().await;

        assert_eq!(mock.connect_calls(), 2);
        assert!(socket.connected());
        assert_eq!(connects.lock().len(), 2);
    }

    #[tokio::test]
    async fn other_disconnects_do_not_reconnect() {
        let (socket, mock) = socket(plain_cipher());
        socket.connect().await.unwrap();

        mock.server_disconnect(DisconnectReason::TransportError);
        settle().await;
        socket.disconnect().await;
        settle().await;

        assert_eq!(mock.connect_calls(), 1);
        assert!(socket.disconnected());
    }

    #[tokio::test]
    async fn connect_signal_fires_after_connect_handlers() {
        let (mock, events) = MockTransport::manual("ws://mock/");
        let socket = EventSocket::with_transport(mock.clone(), events, plain_cipher());
        let order = Arc::new(Mutex::new(Vec::new()));
        let handler_order = order.clone();
        socket.on(CONNECT_EVENT, move |_| {
            let order = handler_order.clone();
            async move { order.lock().push("handler") }
        });

        let signal = socket.connect_signal();
        socket.connect().await.unwrap();
        settle().await;
        assert!(order.lock().is_empty());

        mock.server_connect();
        signal.await.unwrap();
        order.lock().push("signal");
        assert_eq!(*order.lock(), vec!["handler", "signal"]);
    }

    #[tokio::test]
    async fn abandoned_connect_signals_are_pruned() {
        let (socket, _mock) = socket(plain_cipher());
        for _ in 0..50 {
            drop(socket.connect_signal());
        }
        let live = socket.connect_signal();
        assert_eq!(socket.connect_waiter_count(), 1);
        assert_eq!(socket.shared.connect_waiters.lock().len(), 1);

        socket.connect().await.unwrap();
        settle().await;
        live.await.unwrap();
        assert_eq!(socket.connect_waiter_count(), 0);
    }

    #[tokio::test]
    async fn failed_reconnect_is_not_retried() {
        let (socket, mock) = socket(plain_cipher());
        socket.connect().await.unwrap();
        mock.fail_connects(true);

        mock.server_disconnect(DisconnectReason::ServerDisconnect);
        settle().await;

        assert_eq!(mock.connect_calls(), 2);
        assert!(socket.disconnected());
    }

    #[tokio::test]
    async fn off_and_close_remove_handlers() {
        let (socket, mock) = socket(plain_cipher());
        let _ = recorder(&socket, "ON_CHATS");
        let _ = recorder(&socket, "ON_AVATAR");
        socket.off("ON_CHATS");
        assert_eq!(socket.handler_count("ON_CHATS"), 0);
        assert_eq!(socket.handler_count("ON_AVATAR"), 1);

        socket.connect().await.unwrap();
        socket.close().await;
        assert_eq!(socket.handler_count("ON_AVATAR"), 0);
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn transport_errors_are_logged_only() {
        let (logs, _guard) = shock_core::logging::capture_logs();
        let (socket, mock) = socket(plain_cipher());
        socket.connect().await.unwrap();
        mock.inject_error("broken pipe");
        settle().await;
        assert!(socket.connected());
        assert!(logs.has_event(tracing::Level::WARN, "transport error"));
    }
}
