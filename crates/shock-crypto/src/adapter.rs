//! Crypto adapter contract.

use async_trait::async_trait;
use shock_core::CryptoError;
use shock_core::constants::NON_ENCRYPTED_EVENTS;

use crate::envelope::{Envelope, SymmetricKey};

/// Asymmetric encrypt, key unwrap and symmetric decrypt.
///
/// Implementations may be slow (native modules, hardware keystores), so every
/// operation is async. Each call is a suspension point for the caller.
#[async_trait]
pub trait CryptoAdapter: Send + Sync {
    /// Encrypt `plaintext` for the holder of `peer_public_key`.
    async fn encrypt_data(
        &self,
        plaintext: &[u8],
        peer_public_key: &[u8],
    ) -> Result<Envelope, CryptoError>;

    /// Unwrap the data key of an incoming envelope using the secret of
    /// `session_id`.
    async fn decrypt_key(
        &self,
        encrypted_key: &[u8],
        session_id: &str,
    ) -> Result<SymmetricKey, CryptoError>;

    /// Decrypt an envelope body with its unwrapped data key.
    async fn decrypt_data(
        &self,
        encrypted_data: &[u8],
        key: &SymmetricKey,
        iv: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Whether `event` always travels in plaintext.
    fn is_non_encrypted(&self, event: &str) -> bool {
        NON_ENCRYPTED_EVENTS.contains(&event)
    }
}
