//! Event and action kinds, the `{ ok, msg }` emission, and typed payloads.
//!
//! The server speaks in string-named events. Both families are closed
//! enumerations here so that fan-out code matches on every kind.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::AUTH_INVALID_MESSAGES;
use crate::schema::{Chat, SimpleReceivedRequest, SimpleSentRequest, User};

// ─────────────────────────────────────────────────────────────────────────────
// Event: data-fetch family
// ─────────────────────────────────────────────────────────────────────────────

/// Data-fetch events: the client asks for the current value with `{ token }`
/// and the server answers (now and on every change) with an [`Emission`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// Own avatar.
    Avatar,
    /// All chats.
    Chats,
    /// Current handshake address.
    HandshakeAddress,
    /// Own display name.
    DisplayName,
    /// Handshake requests received.
    ReceivedRequests,
    /// Handshake requests sent.
    SentRequests,
    /// Every user known to the node.
    AllUsers,
}

impl Event {
    /// Every data event, in a stable order.
    pub const ALL: [Self; 7] = [
        Self::Avatar,
        Self::Chats,
        Self::HandshakeAddress,
        Self::DisplayName,
        Self::ReceivedRequests,
        Self::SentRequests,
        Self::AllUsers,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Avatar => "ON_AVATAR",
            Self::Chats => "ON_CHATS",
            Self::HandshakeAddress => "ON_HANDSHAKE_ADDRESS",
            Self::DisplayName => "ON_DISPLAY_NAME",
            Self::ReceivedRequests => "ON_RECEIVED_REQUESTS",
            Self::SentRequests => "ON_SENT_REQUESTS",
            Self::AllUsers => "ON_ALL_USERS",
        }
    }

    /// Parse a wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Action: user-initiated family
// ─────────────────────────────────────────────────────────────────────────────

/// User-initiated actions. Each is emitted once and answered once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// Accept a received handshake request.
    AcceptRequest,
    /// Rotate the handshake address.
    GenerateNewHandshakeNode,
    /// Send a handshake request.
    SendHandshakeRequest,
    /// Send a handshake request with a first message attached.
    SendHandshakeRequestWithInitialMsg,
    /// Send a chat message.
    SendMessage,
    /// Send a payment to a contact.
    SendPayment,
    /// Change own avatar.
    SetAvatar,
    /// Change own display name.
    SetDisplayName,
    /// Register an alias on the node.
    Register,
}

impl Action {
    /// Every action, in a stable order.
    pub const ALL: [Self; 9] = [
        Self::AcceptRequest,
        Self::GenerateNewHandshakeNode,
        Self::SendHandshakeRequest,
        Self::SendHandshakeRequestWithInitialMsg,
        Self::SendMessage,
        Self::SendPayment,
        Self::SetAvatar,
        Self::SetDisplayName,
        Self::Register,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AcceptRequest => "ACCEPT_REQUEST",
            Self::GenerateNewHandshakeNode => "GENERATE_NEW_HANDSHAKE_NODE",
            Self::SendHandshakeRequest => "SEND_HANDSHAKE_REQUEST",
            Self::SendHandshakeRequestWithInitialMsg => "SEND_HANDSHAKE_REQUEST_WITH_INITIAL_MSG",
            Self::SendMessage => "SEND_MESSAGE",
            Self::SendPayment => "SEND_PAYMENT",
            Self::SetAvatar => "SET_AVATAR",
            Self::SetDisplayName => "SET_DISPLAY_NAME",
            Self::Register => "REGISTER",
        }
    }

    /// Parse a wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Emission: server response envelope (after decryption)
// ─────────────────────────────────────────────────────────────────────────────

/// Server response to a data request or an action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Emission {
    /// Success indicator.
    pub ok: bool,
    /// Payload on success, error description on failure.
    #[serde(default)]
    pub msg: Value,
    /// The request body the server answered, when echoed back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_body: Option<Value>,
}

impl Emission {
    /// Successful emission carrying `msg`.
    pub fn ok(msg: Value) -> Self {
        Self {
            ok: true,
            msg,
            orig_body: None,
        }
    }

    /// Failed emission with an error description.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            msg: Value::String(msg.into()),
            orig_body: None,
        }
    }

    /// Whether `msg` is one of the sentinel "credentials are no longer
    /// valid" messages.
    pub fn signals_auth_invalid(&self) -> bool {
        is_auth_invalid(&self.msg)
    }
}

/// Whether a response `msg` is one of the auth-invalid sentinels.
pub fn is_auth_invalid(msg: &Value) -> bool {
    msg.as_str()
        .is_some_and(|m| AUTH_INVALID_MESSAGES.contains(&m))
}

// ─────────────────────────────────────────────────────────────────────────────
// EventPayload: typed msg per data event
// ─────────────────────────────────────────────────────────────────────────────

/// The decoded `msg` of a successful data emission, tagged by event kind.
#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    /// [`Event::Avatar`]
    Avatar(Option<String>),
    /// [`Event::Chats`]
    Chats(Vec<Chat>),
    /// [`Event::HandshakeAddress`]
    HandshakeAddress(Option<String>),
    /// [`Event::DisplayName`]
    DisplayName(Option<String>),
    /// [`Event::ReceivedRequests`]
    ReceivedRequests(Vec<SimpleReceivedRequest>),
    /// [`Event::SentRequests`]
    SentRequests(Vec<SimpleSentRequest>),
    /// [`Event::AllUsers`]
    AllUsers(Vec<User>),
}

impl EventPayload {
    /// Decode `msg` according to the payload type of `event`.
    pub fn decode(event: Event, msg: Value) -> Result<Self, serde_json::Error> {
        Ok(match event {
            Event::Avatar => Self::Avatar(serde_json::from_value(msg)?),
            Event::Chats => Self::Chats(serde_json::from_value(msg)?),
            Event::HandshakeAddress => Self::HandshakeAddress(serde_json::from_value(msg)?),
            Event::DisplayName => Self::DisplayName(serde_json::from_value(msg)?),
            Event::ReceivedRequests => Self::ReceivedRequests(serde_json::from_value(msg)?),
            Event::SentRequests => Self::SentRequests(serde_json::from_value(msg)?),
            Event::AllUsers => Self::AllUsers(serde_json::from_value(msg)?),
        })
    }

    /// The event kind this payload belongs to.
    pub fn event(&self) -> Event {
        match self {
            Self::Avatar(_) => Event::Avatar,
            Self::Chats(_) => Event::Chats,
            Self::HandshakeAddress(_) => Event::HandshakeAddress,
            Self::DisplayName(_) => Event::DisplayName,
            Self::ReceivedRequests(_) => Event::ReceivedRequests,
            Self::SentRequests(_) => Event::SentRequests,
            Self::AllUsers(_) => Event::AllUsers,
        }
    }
}
