//! # shock-crypto
//!
//! The encryption boundary of the Shock socket client:
//!
//! - [`CryptoAdapter`]: asymmetric encrypt, key unwrap, symmetric decrypt
//! - [`HybridCipher`]: X25519 + HKDF-SHA256 + XChaCha20-Poly1305 adapter with
//!   an in-memory session key store
//! - [`SessionCryptoContext`]: negotiated peer public key and session id
//! - [`SessionCipher`]: the gate applied to every outgoing and incoming payload
//!
//! ## Crate Position
//!
//! Depends on `shock-core`. Used by `shock-transport`.

#![deny(unsafe_code)]

pub mod adapter;
pub mod context;
pub mod envelope;
pub mod gate;
pub mod hybrid;

pub use adapter::CryptoAdapter;
pub use context::SessionCryptoContext;
pub use envelope::{Envelope, SymmetricKey};
pub use gate::{EncryptionPolicy, SessionCipher, is_empty};
pub use hybrid::HybridCipher;
