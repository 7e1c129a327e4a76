//! Payload shapes carried by the data events.
//!
//! Field names follow the node's camelCase JSON. Optional profile fields are
//! `null` on the wire until the contact has set them.

use serde::{Deserialize, Serialize};

/// One message inside a chat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message id.
    pub id: String,
    /// Message text.
    pub body: String,
    /// Whether this client sent the message.
    pub outgoing: bool,
    /// Unix epoch milliseconds.
    pub timestamp: u64,
}

/// A conversation with one contact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Chat id.
    pub id: String,
    /// Messages in chronological order.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Contact's avatar (base64 image), if set.
    #[serde(default)]
    pub recipient_avatar: Option<String>,
    /// Contact's display name, if set.
    #[serde(default)]
    pub recipient_display_name: Option<String>,
    /// Contact's public key.
    pub recipient_public_key: String,
}

/// A handshake request received from another user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleReceivedRequest {
    /// Request id.
    pub id: String,
    /// Requestor's avatar, if set.
    #[serde(default)]
    pub requestor_avatar: Option<String>,
    /// Requestor's display name, if set.
    #[serde(default)]
    pub requestor_display_name: Option<String>,
    /// Requestor's public key.
    #[serde(rename = "requestorPK")]
    pub requestor_pk: String,
    /// Initial message sent along with the request.
    #[serde(default)]
    pub response: String,
    /// Unix epoch milliseconds.
    pub timestamp: u64,
}

/// A handshake request this user sent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleSentRequest {
    /// Request id.
    pub id: String,
    /// Recipient's avatar, if set.
    #[serde(default)]
    pub recipient_avatar: Option<String>,
    /// Whether the recipient rotated their handshake address since.
    #[serde(default)]
    pub recipient_changed_request_address: bool,
    /// Recipient's display name, if set.
    #[serde(default)]
    pub recipient_display_name: Option<String>,
    /// Recipient's public key.
    pub recipient_public_key: String,
    /// Unix epoch milliseconds.
    pub timestamp: u64,
}

/// A user known to the node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Avatar, if set.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Display name, if set.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Public key.
    pub public_key: String,
}

/// Result of a `REGISTER` action, delivered whether or not it succeeded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegisterResult {
    /// Whether registration succeeded.
    pub ok: bool,
    /// Failure description when `ok` is false.
    #[serde(default)]
    pub msg: Option<String>,
    /// Alias that was registered.
    #[serde(default)]
    pub alias: String,
    /// Password that was registered.
    #[serde(default)]
    pub pass: String,
}
