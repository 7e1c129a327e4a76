//! Outgoing payload preparation and incoming payload resolution.
//!
//! Outgoing, in order:
//! 1. encryption disabled: payload unchanged
//! 2. plaintext event kind: payload unchanged
//! 3. empty payload: `null`
//! 4. no peer key: [`CryptoError::MissingPeerKey`]
//! 5. otherwise: serialized, encrypted, sent as an [`Envelope`]
//!
//! Incoming: plaintext event kinds and payloads without the encrypted-key
//! marker pass through; envelopes are unwrapped with the session id and
//! decrypted back to JSON.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use shock_core::CryptoError;
use tracing::{debug, trace};

use crate::adapter::CryptoAdapter;
use crate::context::SessionCryptoContext;
use crate::envelope::Envelope;

/// How the gate treats payloads regardless of key state.
#[derive(Clone, Debug, Default)]
pub struct EncryptionPolicy {
    /// Send every payload in plaintext.
    pub disabled: bool,
    /// Event names added to the adapter's plaintext allow-list.
    pub plain_events: HashSet<String>,
}

impl EncryptionPolicy {
    /// Policy with encryption off.
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            plain_events: HashSet::new(),
        }
    }
}

/// Encryption boundary between callers and the physical channel.
pub struct SessionCipher {
    adapter: Arc<dyn CryptoAdapter>,
    context: Arc<SessionCryptoContext>,
    policy: EncryptionPolicy,
}

impl SessionCipher {
    /// Create a gate over `adapter` reading keys from `context`.
    pub fn new(
        adapter: Arc<dyn CryptoAdapter>,
        context: Arc<SessionCryptoContext>,
        policy: EncryptionPolicy,
    ) -> Self {
        Self {
            adapter,
            context,
            policy,
        }
    }

    /// The key material this gate reads.
    pub fn context(&self) -> &Arc<SessionCryptoContext> {
        &self.context
    }

    /// Whether `event` is on the plaintext allow-list.
    pub fn is_plaintext_event(&self, event: &str) -> bool {
        self.adapter.is_non_encrypted(event) || self.policy.plain_events.contains(event)
    }

    /// Turn a caller payload into what goes on the wire.
    pub async fn prepare_outgoing(&self, event: &str, payload: Value) -> Result<Value, CryptoError> {
        if self.policy.disabled || self.is_plaintext_event(event) {
            return Ok(payload);
        }
        if is_empty(&payload) {
            trace!(event, "empty payload, sending null");
            return Ok(Value::Null);
        }
        let Some(peer_key) = self.context.peer_public_key() else {
            return Err(CryptoError::MissingPeerKey);
        };

        let plaintext = serde_json::to_vec(&payload)
            .map_err(|e| CryptoError::Encoding(format!("payload not serializable: {e}")))?;
        let envelope = self.adapter.encrypt_data(&plaintext, &peer_key).await?;
        debug!(event, bytes = plaintext.len(), "encrypted outgoing payload");
        Ok(envelope.to_wire())
    }

    /// Turn wire data back into the caller-visible payload.
    pub async fn resolve_incoming(&self, event: &str, data: Value) -> Result<Value, CryptoError> {
        if self.is_plaintext_event(event) || !Envelope::is_envelope(&data) {
            return Ok(data);
        }
        let Some(session_id) = self.context.session_id() else {
            return Err(CryptoError::MissingSessionId);
        };

        let envelope = Envelope::from_wire(&data)?;
        let key = self
            .adapter
            .decrypt_key(&envelope.encrypted_key, &session_id)
            .await?;
        let plaintext = self
            .adapter
            .decrypt_data(&envelope.encrypted_data, &key, &envelope.iv)
            .await?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| CryptoError::Decrypt(format!("plaintext is not JSON: {e}")))
    }
}

/// Emptiness in the lodash `isEmpty` sense.
///
/// Objects, arrays and strings are empty with no entries. Scalars (`null`,
/// numbers, booleans) have no entries and are always empty.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Null | Value::Bool(_) | Value::Number(_) => true,
    }
}
