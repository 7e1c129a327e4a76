//! X25519 + XChaCha20-Poly1305 hybrid cipher.
//!
//! Each message gets a fresh random 256-bit data key and a random 24-byte IV
//! for the body. The data key is wrapped to the recipient with an ephemeral
//! X25519 exchange whose shared secret is stretched with HKDF-SHA256:
//!
//! ```text
//! encryptedKey = ephemeral_public (32) || wrap_nonce (24) || wrapped_key (32 + 16 tag)
//! ```
//!
//! The ephemeral public key is bound into both the HKDF salt and the wrap
//! AAD. Session secrets live in memory keyed by session id.

use std::collections::HashMap;

use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use parking_lot::RwLock;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use shock_core::CryptoError;
use tracing::debug;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::adapter::CryptoAdapter;
use crate::envelope::{Envelope, SymmetricKey};

/// Byte length of an X25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Byte length of an XChaCha20 nonce.
pub const NONCE_LEN: usize = 24;
/// Byte length of a Poly1305 tag.
pub const TAG_LEN: usize = 16;
/// Byte length of `encryptedKey`.
pub const ENCRYPTED_KEY_LEN: usize = PUBLIC_KEY_LEN + NONCE_LEN + SymmetricKey::LEN + TAG_LEN;

const WRAP_INFO: &[u8] = b"shock-socket/key-wrap/v1";

/// Hybrid public-key cipher with an in-memory session key store.
#[derive(Default)]
pub struct HybridCipher {
    sessions: RwLock<HashMap<String, StaticSecret>>,
}

impl HybridCipher {
    /// Cipher with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) the secret for `session_id` and return its public
    /// half for the key exchange.
    pub fn generate_session_key(&self, session_id: &str) -> [u8; PUBLIC_KEY_LEN] {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret).to_bytes();
        let _ = self.sessions.write().insert(session_id.to_owned(), secret);
        debug!(session_id, "generated session key");
        public
    }

    /// Public half of an existing session secret.
    pub fn session_public_key(&self, session_id: &str) -> Option<[u8; PUBLIC_KEY_LEN]> {
        self.sessions
            .read()
            .get(session_id)
            .map(|secret| PublicKey::from(secret).to_bytes())
    }

    /// Drop the secret of `session_id`. Returns whether one existed.
    pub fn forget_session(&self, session_id: &str) -> bool {
        self.sessions.write().remove(session_id).is_some()
    }
}

#[async_trait]
impl CryptoAdapter for HybridCipher {
    async fn encrypt_data(
        &self,
        plaintext: &[u8],
        peer_public_key: &[u8],
    ) -> Result<Envelope, CryptoError> {
        let peer = parse_public_key(peer_public_key)?;

        let mut data_key = Zeroizing::new([0u8; SymmetricKey::LEN]);
        OsRng.fill_bytes(&mut *data_key);
        let iv = random_nonce();
        let encrypted_data = seal(&data_key, &iv, plaintext, &[])?;

        let ephemeral = StaticSecret::random_from_rng(OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&peer);
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidKey("peer public key is low order".into()));
        }
        let wrap_key = derive_wrap_key(shared.as_bytes(), ephemeral_public.as_bytes(), peer.as_bytes())?;
        let wrap_nonce = random_nonce();
        let wrapped = seal(&wrap_key, &wrap_nonce, &*data_key, ephemeral_public.as_bytes())?;

        let mut encrypted_key = Vec::with_capacity(ENCRYPTED_KEY_LEN);
        encrypted_key.extend_from_slice(ephemeral_public.as_bytes());
        encrypted_key.extend_from_slice(&wrap_nonce);
        encrypted_key.extend_from_slice(&wrapped);

        Ok(Envelope {
            encrypted_key,
            encrypted_data,
            iv: iv.to_vec(),
        })
    }

    async fn decrypt_key(
        &self,
        encrypted_key: &[u8],
        session_id: &str,
    ) -> Result<SymmetricKey, CryptoError> {
        if encrypted_key.len() != ENCRYPTED_KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "encryptedKey must be {ENCRYPTED_KEY_LEN} bytes, got {}",
                encrypted_key.len()
            )));
        }
        let (ephemeral_bytes, rest) = encrypted_key.split_at(PUBLIC_KEY_LEN);
        let (wrap_nonce, wrapped) = rest.split_at(NONCE_LEN);
        let ephemeral_public = parse_public_key(ephemeral_bytes)?;

        let (shared, own_public) = {
            let sessions = self.sessions.read();
            let secret = sessions
                .get(session_id)
                .ok_or_else(|| CryptoError::UnknownSession(session_id.to_owned()))?;
            (secret.diffie_hellman(&ephemeral_public), PublicKey::from(secret))
        };
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidKey("ephemeral key is low order".into()));
        }

        let wrap_key = derive_wrap_key(shared.as_bytes(), ephemeral_public.as_bytes(), own_public.as_bytes())?;
        let data_key = Zeroizing::new(open(&wrap_key, wrap_nonce, wrapped, ephemeral_public.as_bytes())?);
        SymmetricKey::from_slice(&data_key)
    }

    async fn decrypt_data(
        &self,
        encrypted_data: &[u8],
        key: &SymmetricKey,
        iv: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        open(key.as_bytes(), iv, encrypted_data, &[])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Primitives
// ─────────────────────────────────────────────────────────────────────────────

fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    let arr: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "public key must be {PUBLIC_KEY_LEN} bytes, got {}",
            bytes.len()
        ))
    })?;
    Ok(PublicKey::from(arr))
}

fn random_nonce() -> [u8; NONCE_LEN] {
    let mut bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

fn derive_wrap_key(
    shared: &[u8; 32],
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral_public);
    salt[32..].copy_from_slice(recipient_public);

    let hk = Hkdf::<Sha256>::new(Some(&salt[..]), shared);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(WRAP_INFO, &mut *okm)
        .map_err(|e| CryptoError::Encrypt(format!("HKDF expansion failed: {e}")))?;
    Ok(okm)
}

fn seal(key: &[u8; 32], nonce: &[u8; NONCE_LEN], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(XNonce::from_slice(nonce), Payload { msg, aad })
        .map_err(|e| CryptoError::Encrypt(format!("XChaCha20-Poly1305 encryption failed: {e}")))
}

fn open(key: &[u8; 32], nonce: &[u8], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::Decrypt(format!(
            "iv must be {NONCE_LEN} bytes, got {}",
            nonce.len()
        )));
    }
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg, aad })
        .map_err(|e| CryptoError::Decrypt(format!("XChaCha20-Poly1305 decryption failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn encrypt_then_decrypt_for_own_session() {
        let cipher = HybridCipher::new();
        let public = cipher.generate_session_key("s1");

        let env = cipher.encrypt_data(b"{\"a\":1}", &public).await.unwrap();
        assert_eq!(env.encrypted_key.len(), ENCRYPTED_KEY_LEN);
        assert_eq!(env.iv.len(), NONCE_LEN);
        assert_eq!(env.encrypted_data.len(), 7 + TAG_LEN);

        let key = cipher.decrypt_key(&env.encrypted_key, "s1").await.unwrap();
        let plain = cipher.decrypt_data(&env.encrypted_data, &key, &env.iv).await.unwrap();
        assert_eq!(plain, b"{\"a\":1}");
    }

    #[tokio::test]
    async fn unknown_session_is_rejected() {
        let cipher = HybridCipher::new();
        let public = cipher.generate_session_key("s1");
        let env = cipher.encrypt_data(b"x", &public).await.unwrap();
        assert_matches!(
            cipher.decrypt_key(&env.encrypted_key, "s2").await,
            Err(CryptoError::UnknownSession(_))
        );
    }

    #[tokio::test]
    async fn other_sessions_key_cannot_unwrap() {
        let cipher = HybridCipher::new();
        let public_a = cipher.generate_session_key("a");
        let _ = cipher.generate_session_key("b");
        let env = cipher.encrypt_data(b"x", &public_a).await.unwrap();
        assert_matches!(
            cipher.decrypt_key(&env.encrypted_key, "b").await,
            Err(CryptoError::Decrypt(_))
        );
    }

    #[tokio::test]
    async fn tampered_body_fails_authentication() {
        let cipher = HybridCipher::new();
        let public = cipher.generate_session_key("s1");
        let mut env = cipher.encrypt_data(b"hello", &public).await.unwrap();
        env.encrypted_data[0] ^= 1;
        let key = cipher.decrypt_key(&env.encrypted_key, "s1").await.unwrap();
        assert_matches!(
            cipher.decrypt_data(&env.encrypted_data, &key, &env.iv).await,
            Err(CryptoError::Decrypt(_))
        );
    }

    #[tokio::test]
    async fn short_peer_key_is_invalid() {
        let cipher = HybridCipher::new();
        assert_matches!(
            cipher.encrypt_data(b"x", &[1, 2, 3]).await,
            Err(CryptoError::InvalidKey(_))
        );
    }

    #[tokio::test]
    async fn all_zero_peer_key_is_low_order() {
        let cipher = HybridCipher::new();
        assert_matches!(
            cipher.encrypt_data(b"x", &[0u8; 32]).await,
            Err(CryptoError::InvalidKey(_))
        );
    }

    #[tokio::test]
    async fn truncated_encrypted_key_is_invalid() {
        let cipher = HybridCipher::new();
        let _ = cipher.generate_session_key("s1");
        assert_matches!(
            cipher.decrypt_key(&[0u8; 10], "s1").await,
            Err(CryptoError::InvalidKey(_))
        );
    }

    #[tokio::test]
    async fn wrong_iv_length_fails() {
        let cipher = HybridCipher::new();
        let key = SymmetricKey::from_bytes([9; 32]);
        assert_matches!(
            cipher.decrypt_data(&[0u8; 20], &key, &[0u8; 12]).await,
            Err(CryptoError::Decrypt(_))
        );
    }

    #[test]
    fn session_lifecycle() {
        let cipher = HybridCipher::new();
        let public = cipher.generate_session_key("s1");
        assert_eq!(cipher.session_public_key("s1"), Some(public));
        assert!(cipher.forget_session("s1"));
        assert!(!cipher.forget_session("s1"));
        assert!(cipher.session_public_key("s1").is_none());
    }
}
