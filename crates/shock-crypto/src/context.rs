//! Negotiated session key material.

use parking_lot::RwLock;

#[derive(Default)]
struct ContextState {
    peer_public_key: Option<Vec<u8>>,
    session_id: Option<String>,
}

/// Peer public key and session id from the external key exchange.
///
/// This subsystem only reads it. The key-exchange flow that owns it writes
/// through the setters.
#[derive(Default)]
pub struct SessionCryptoContext {
    state: RwLock<ContextState>,
}

impl SessionCryptoContext {
    /// Context with nothing negotiated yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context seeded with both halves of a finished exchange.
    pub fn with_session(peer_public_key: Vec<u8>, session_id: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(ContextState {
                peer_public_key: Some(peer_public_key),
                session_id: Some(session_id.into()),
            }),
        }
    }

    /// The server's public key, if exchanged.
    pub fn peer_public_key(&self) -> Option<Vec<u8>> {
        self.state.read().peer_public_key.clone()
    }

    /// Our session id, if exchanged.
    pub fn session_id(&self) -> Option<String> {
        self.state.read().session_id.clone()
    }

    /// Install the server's public key.
    pub fn set_peer_public_key(&self, key: Vec<u8>) {
        self.state.write().peer_public_key = Some(key);
    }

    /// Install our session id.
    pub fn set_session_id(&self, session_id: impl Into<String>) {
        self.state.write().session_id = Some(session_id.into());
    }

    /// Forget both halves, e.g. after logout.
    pub fn clear(&self) {
        *self.state.write() = ContextState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let ctx = SessionCryptoContext::new();
        assert!(ctx.peer_public_key().is_none());
        assert!(ctx.session_id().is_none());
    }

    #[test]
    fn set_then_clear() {
        let ctx = SessionCryptoContext::new();
        ctx.set_peer_public_key(vec![7; 32]);
        ctx.set_session_id("sess-1");
        assert_eq!(ctx.peer_public_key(), Some(vec![7; 32]));
        assert_eq!(ctx.session_id().as_deref(), Some("sess-1"));
        ctx.clear();
        assert!(ctx.peer_public_key().is_none());
        assert!(ctx.session_id().is_none());
    }
}
