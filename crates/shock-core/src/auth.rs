//! Credential store contract and the auth-invalidation rule.
//!
//! The token is owned by an external store. This subsystem reads it to attach
//! to requests and, when the server signals the token is no longer valid,
//! asks the store to clear it. It never retries the failed request.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::ShockError;
use crate::events::{Emission, is_auth_invalid};

/// Authentication data issued by the node on login.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthData {
    /// Bearer token attached to every request.
    pub token: String,
    /// Alias the user logged in with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// User public key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// What the credential store persists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAuthData {
    /// Auth data for the current node.
    pub auth_data: AuthData,
}

impl StoredAuthData {
    /// Stored data holding only a token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            auth_data: AuthData {
                token: token.into(),
                alias: None,
                public_key: None,
            },
        }
    }
}

/// External credential store.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Currently stored auth data, if any.
    async fn stored_auth_data(&self) -> Option<StoredAuthData>;

    /// Replace the stored auth data; `None` clears it.
    async fn write_stored_auth_data(&self, value: Option<StoredAuthData>);
}

/// Read the current token, failing with [`ShockError::MissingAuthToken`]
/// when none is cached.
pub async fn current_token(store: &dyn CredentialStore) -> Result<String, ShockError> {
    store
        .stored_auth_data()
        .await
        .map(|data| data.auth_data.token)
        .ok_or(ShockError::MissingAuthToken)
}

/// Apply the auth-invalidation rule to a response.
///
/// Clears the stored credentials when `emission` carries one of the sentinel
/// messages. Returns whether it did. Clearing twice is harmless.
pub async fn invalidate_on_sentinel(
    store: &dyn CredentialStore,
    source: &str,
    emission: &Emission,
) -> bool {
    clear_if_sentinel(store, source, &emission.msg).await
}

/// Apply the auth-invalidation rule to a raw response of any shape.
///
/// Only the `msg` field is inspected, so responses without a usable `ok`
/// flag still clear the credentials.
pub async fn invalidate_on_response(
    store: &dyn CredentialStore,
    source: &str,
    response: &Value,
) -> bool {
    match response.get("msg") {
        Some(msg) => clear_if_sentinel(store, source, msg).await,
        None => false,
    }
}

async fn clear_if_sentinel(store: &dyn CredentialStore, source: &str, msg: &Value) -> bool {
    if !is_auth_invalid(msg) {
        return false;
    }
    info!(source, msg = %msg, "server rejected credentials, clearing auth token");
    store.write_stored_auth_data(None).await;
    true
}

/// In-process credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Option<StoredAuthData>>,
}

impl MemoryCredentialStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Some(StoredAuthData::with_token(token))),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn stored_auth_data(&self) -> Option<StoredAuthData> {
        self.inner.lock().clone()
    }

    async fn write_stored_auth_data(&self, value: Option<StoredAuthData>) {
        debug!(present = value.is_some(), "writing stored auth data");
        *self.inner.lock() = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn current_token_reads_store() {
        let store = MemoryCredentialStore::with_token("tok_1");
        assert_eq!(current_token(&store).await.unwrap(), "tok_1");
    }

    #[tokio::test]
    async fn current_token_missing() {
        let store = MemoryCredentialStore::new();
        assert_matches!(current_token(&store).await, Err(ShockError::MissingAuthToken));
    }

    #[tokio::test]
    async fn sentinel_clears_store() {
        let store = MemoryCredentialStore::with_token("tok_1");
        let cleared =
            invalidate_on_sentinel(&store, "ON_CHATS", &Emission::failed("Token expired.")).await;
        assert!(cleared);
        assert!(store.stored_auth_data().await.is_none());
    }

    #[tokio::test]
    async fn clearing_twice_is_a_no_op() {
        let store = MemoryCredentialStore::new();
        let em = Emission::failed("NOT_AUTH");
        assert!(invalidate_on_sentinel(&store, "SEND_MESSAGE", &em).await);
        assert!(invalidate_on_sentinel(&store, "SEND_MESSAGE", &em).await);
        assert!(store.stored_auth_data().await.is_none());
    }

    #[tokio::test]
    async fn ordinary_failure_keeps_token() {
        let store = MemoryCredentialStore::with_token("tok_1");
        let cleared =
            invalidate_on_sentinel(&store, "ON_CHATS", &Emission::failed("gun timeout")).await;
        assert!(!cleared);
        assert!(store.stored_auth_data().await.is_some());
    }

    #[tokio::test]
    async fn raw_response_without_ok_still_clears() {
        let store = MemoryCredentialStore::with_token("tok_1");
        let response = serde_json::json!({"msg": "Token expired."});
        assert!(invalidate_on_response(&store, "ON_CHATS", &response).await);
        assert!(store.stored_auth_data().await.is_none());
    }

    #[tokio::test]
    async fn raw_response_with_odd_ok_still_clears() {
        let store = MemoryCredentialStore::with_token("tok_1");
        let response = serde_json::json!({"ok": "nope", "msg": "NOT_AUTH"});
        assert!(invalidate_on_response(&store, "SEND_MESSAGE", &response).await);
        assert!(store.stored_auth_data().await.is_none());
    }

    #[tokio::test]
    async fn raw_response_without_msg_keeps_token() {
        let store = MemoryCredentialStore::with_token("tok_1");
        for response in [serde_json::json!(true), serde_json::json!({"ok": false})] {
            assert!(!invalidate_on_response(&store, "ON_CHATS", &response).await);
        }
        assert!(store.stored_auth_data().await.is_some());
    }

    #[test]
    fn stored_auth_data_json_shape() {
        let json = serde_json::to_value(StoredAuthData::with_token("t")).unwrap();
        assert_eq!(json, serde_json::json!({"authData": {"token": "t"}}));
    }
}
