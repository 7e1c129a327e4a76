//! Encrypted wire envelope and the symmetric key it carries.
//!
//! On the wire an envelope is `{ encryptedKey, encryptedData, iv }` with each
//! field a standard base64 string. The presence of a non-empty
//! `encryptedKey` is what marks an incoming payload as encrypted.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::Value;
use shock_core::CryptoError;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Field whose presence marks an encrypted payload.
pub const ENCRYPTED_KEY_FIELD: &str = "encryptedKey";

/// Ciphertext envelope produced by a [`crate::CryptoAdapter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Data key wrapped to the recipient's public key.
    pub encrypted_key: Vec<u8>,
    /// Payload body encrypted with the data key.
    pub encrypted_data: Vec<u8>,
    /// Initialization vector for the body cipher.
    pub iv: Vec<u8>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    encrypted_key: String,
    encrypted_data: String,
    iv: String,
}

impl Envelope {
    /// Whether `data` carries the encrypted-key marker.
    pub fn is_envelope(data: &Value) -> bool {
        match data.get(ENCRYPTED_KEY_FIELD) {
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Null | Value::Bool(false)) | None => false,
            Some(_) => true,
        }
    }

    /// Serialize to the JSON wire form.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "encryptedKey": STANDARD.encode(&self.encrypted_key),
            "encryptedData": STANDARD.encode(&self.encrypted_data),
            "iv": STANDARD.encode(&self.iv),
        })
    }

    /// Parse the JSON wire form.
    pub fn from_wire(data: &Value) -> Result<Self, CryptoError> {
        let wire = WireEnvelope::deserialize(data)
            .map_err(|e| CryptoError::Encoding(format!("malformed envelope: {e}")))?;
        Ok(Self {
            encrypted_key: decode_field("encryptedKey", &wire.encrypted_key)?,
            encrypted_data: decode_field("encryptedData", &wire.encrypted_data)?,
            iv: decode_field("iv", &wire.iv)?,
        })
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(value)
        .map_err(|e| CryptoError::Encoding(format!("{name} is not base64: {e}")))
}

/// 256-bit symmetric data key. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; 32]);

impl SymmetricKey {
    /// Byte length of a data key.
    pub const LEN: usize = 32;

    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("data key must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// SymmetricKey does not implement Clone/Debug to keep key bytes out of logs.

// Test-only, redacted Debug so `assert_matches!` can format `Result<SymmetricKey, _>`.
#[cfg(test)]
impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn wire_form_is_base64_camel_case() {
        let env = Envelope {
            encrypted_key: vec![1, 2, 3],
            encrypted_data: vec![4],
            iv: vec![],
        };
        let wire = env.to_wire();
        assert_eq!(wire, json!({"encryptedKey": "AQID", "encryptedData": "BA==", "iv": ""}));
        assert_eq!(Envelope::from_wire(&wire).unwrap(), env);
    }

    #[test]
    fn marker_detection() {
        assert!(Envelope::is_envelope(&json!({"encryptedKey": "AQID"})));
        assert!(!Envelope::is_envelope(&json!({"encryptedKey": ""})));
        assert!(!Envelope::is_envelope(&json!({"encryptedKey": null})));
        assert!(!Envelope::is_envelope(&json!({"ok": true, "msg": []})));
        assert!(!Envelope::is_envelope(&json!("encryptedKey")));
        assert!(!Envelope::is_envelope(&Value::Null));
    }

    #[test]
    fn bad_base64_is_an_encoding_error() {
        let wire = json!({"encryptedKey": "***", "encryptedData": "", "iv": ""});
        assert_matches!(Envelope::from_wire(&wire), Err(CryptoError::Encoding(_)));
    }

    #[test]
    fn missing_field_is_an_encoding_error() {
        let wire = json!({"encryptedKey": "AQID"});
        assert_matches!(Envelope::from_wire(&wire), Err(CryptoError::Encoding(_)));
    }

    #[test]
    fn symmetric_key_length_checked() {
        assert!(SymmetricKey::from_slice(&[0u8; 32]).is_ok());
        assert_matches!(
            SymmetricKey::from_slice(&[0u8; 16]),
            Err(CryptoError::InvalidKey(_))
        );
    }
}
