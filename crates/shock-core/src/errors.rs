//! Error taxonomy for the Shock socket client.
//!
//! - [`ShockError`]: caller-visible failures (subscription bookkeeping,
//!   missing credentials, missing session key, transport and crypto errors)
//! - [`CryptoError`]: failures inside the encryption gate or crypto adapter
//! - [`TransportError`]: failures of the physical channel
//!
//! Decryption failures and transport errors seen by background tasks are
//! logged and dropped by their owners; they only reach callers through
//! operations that return `Result`.

use thiserror::Error;

/// Top-level error type returned to callers.
#[derive(Debug, Error)]
pub enum ShockError {
    /// The listener is already registered for this event kind.
    #[error("tried to subscribe twice to {event}")]
    DuplicateSubscription {
        /// Event kind the listener was registered for.
        event: String,
    },

    /// The listener is no longer registered for this event kind.
    #[error("tried to unsubscribe twice from {event}")]
    UnknownUnsubscribe {
        /// Event kind the listener was registered for.
        event: String,
    },

    /// A request needed an auth token but none is cached.
    #[error("no auth token cached")]
    MissingAuthToken,

    /// Encryption is required but no peer public key has been exchanged yet.
    #[error("exchange keys with the API before sending any data through the socket")]
    MissingPeerKey,

    /// Any other crypto failure.
    #[error("{0}")]
    Crypto(CryptoError),

    /// Physical channel failure.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// Payload (de)serialization failure.
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<CryptoError> for ShockError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::MissingPeerKey => Self::MissingPeerKey,
            other => Self::Crypto(other),
        }
    }
}

impl ShockError {
    /// Whether this is a programmer error in subscribe/unsubscribe bookkeeping.
    #[must_use]
    pub fn is_subscription_misuse(&self) -> bool {
        matches!(
            self,
            Self::DuplicateSubscription { .. } | Self::UnknownUnsubscribe { .. }
        )
    }
}

/// Errors raised by the encryption gate and crypto adapters.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Outgoing payload needs encryption but no peer key is set.
    #[error("no peer public key available")]
    MissingPeerKey,

    /// Incoming envelope needs a session id to unwrap its key.
    #[error("no session id available to unwrap key")]
    MissingSessionId,

    /// The key store holds no secret for this session.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// Key material has the wrong shape.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encrypt(String),

    /// Decryption or authentication failed.
    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// Envelope or plaintext could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Errors raised by a physical transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The channel is not connected.
    #[error("channel is not connected")]
    NotConnected,

    /// Establishing the connection failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(String),

    /// The endpoint URL could not be built.
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),

    /// The channel was closed underneath the caller.
    #[error("channel closed")]
    Closed,
}
