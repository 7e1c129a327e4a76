//! # shock-transport
//!
//! Physical channels and the encrypting event socket built on them:
//!
//! - [`Transport`] / [`TransportFactory`]: one bidirectional channel of named
//!   JSON events with lifecycle notifications
//! - [`WsTransport`]: the WebSocket implementation (`tokio-tungstenite`)
//! - [`EventSocket`]: applies the session cipher to every payload, dispatches
//!   incoming events to async handlers and reconnects after server disconnects
//! - [`urls`]: data-channel and heartbeat endpoint URLs
//! - [`testutil`]: scriptable in-memory transports
//!
//! ## Crate Position
//!
//! Depends on `shock-core` and `shock-crypto`. Used by `shock-events` and
//! `shock-liveness`.

#![deny(unsafe_code)]

pub mod frame;
pub mod socket;
pub mod testutil;
pub mod transport;
pub mod urls;
pub mod ws;

pub use frame::Frame;
pub use socket::{CONNECT_EVENT, DISCONNECT_EVENT, EventHandler, EventSocket};
pub use transport::{DisconnectReason, Transport, TransportEvent, TransportEvents, TransportFactory};
pub use urls::{data_channel_url, heartbeat_url};
pub use ws::{WsTransport, WsTransportFactory};
