//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each live connection owns one I/O task that multiplexes the outgoing queue
//! and the incoming stream. The task stops on cancellation (client
//! disconnect) or when the stream ends, and reports the reason.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use shock_core::TransportError;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::frame::Frame;
use crate::transport::{
    DisconnectReason, Transport, TransportEvent, TransportEvents, TransportFactory,
};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct LiveConnection {
    outgoing: mpsc::UnboundedSender<Message>,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
}

/// A [`Transport`] speaking JSON text frames over a WebSocket.
pub struct WsTransport {
    url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    live: Mutex<Option<LiveConnection>>,
    connecting: tokio::sync::Mutex<()>,
}

impl WsTransport {
    /// Create an unconnected transport and its event stream.
    pub fn new(url: impl Into<String>) -> (Self, TransportEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = Self {
            url: url.into(),
            events,
            live: Mutex::new(None),
            connecting: tokio::sync::Mutex::new(()),
        };
        (transport, rx)
    }

    /// Endpoint this transport connects to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let _guard = self.connecting.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(url = %self.url, "websocket connected");

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        *self.live.lock() = Some(LiveConnection {
            outgoing,
            alive: alive.clone(),
            cancel: cancel.clone(),
        });
        let _ = self.events.send(TransportEvent::Connected);

        let _ = tokio::spawn(run_connection(ws, outgoing_rx, self.events.clone(), alive, cancel));
        Ok(())
    }

    async fn disconnect(&self) {
        let Some(live) = self.live.lock().take() else {
            return;
        };
        let was_alive = live.alive.swap(false, Ordering::SeqCst);
        live.cancel.cancel();
        if was_alive {
            let _ = self
                .events
                .send(TransportEvent::Disconnected(DisconnectReason::ClientDisconnect));
        }
    }

    fn is_connected(&self) -> bool {
        self.live
            .lock()
            .as_ref()
            .is_some_and(|live| live.alive.load(Ordering::SeqCst))
    }

    async fn send(&self, event: &str, data: &Value) -> Result<(), TransportError> {
        let outgoing = {
            let live = self.live.lock();
            match live.as_ref() {
                Some(live) if live.alive.load(Ordering::SeqCst) => live.outgoing.clone(),
                _ => return Err(TransportError::NotConnected),
            }
        };
        let text = Frame::new(event, data.clone())
            .encode()
            .map_err(|e| TransportError::Send(e.to_string()))?;
        outgoing
            .send(Message::Text(text.into()))
            .map_err(|_| TransportError::Closed)
    }
}

async fn run_connection(
    ws: WsStream,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<TransportEvent>,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let reason = loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                return;
            }
            msg = outgoing.recv() => {
                let Some(msg) = msg else { break DisconnectReason::TransportClose };
                if let Err(e) = ws_tx.send(msg).await {
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break DisconnectReason::TransportError;
                }
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match Frame::decode(&text) {
                    Ok(frame) => {
                        let _ = events.send(TransportEvent::Message {
                            event: frame.event,
                            data: frame.data,
                        });
                    }
                    Err(e) => warn!(error = %e, "discarding malformed frame"),
                },
                Some(Ok(Message::Close(_))) => break DisconnectReason::ServerDisconnect,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break DisconnectReason::TransportError;
                }
                None => break DisconnectReason::TransportClose,
            },
        }
    };

    // A concurrent disconnect() may already have reported this connection.
    if alive.swap(false, Ordering::SeqCst) {
        info!(%reason, "websocket disconnected");
        let _ = events.send(TransportEvent::Disconnected(reason));
    }
}

/// Factory producing [`WsTransport`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsTransportFactory;

impl TransportFactory for WsTransportFactory {
    fn open(&self, url: &str) -> Result<(Arc<dyn Transport>, TransportEvents), TransportError> {
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(TransportError::InvalidUrl(url.to_owned()));
        }
        let (transport, events) = WsTransport::new(url);
        let transport: Arc<dyn Transport> = Arc::new(transport);
        Ok((transport, events))
    }
}
