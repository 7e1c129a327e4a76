//! Protocol constants shared by the data channel and the heartbeat channel.

/// Default port a Shock API node listens on.
pub const DEFAULT_PORT: u16 = 9835;

/// Query parameter carrying the device identifier on the data channel.
pub const DEVICE_ID_QUERY_KEY: &str = "x-shockwallet-device-id";

/// Query parameter carrying the auth token on the heartbeat channel.
pub const TOKEN_QUERY_KEY: &str = "token";

/// Default path of the heartbeat endpoint, relative to the node host.
pub const HEARTBEAT_PATH: &str = "shockping";

/// Event emitted repeatedly by the server on the heartbeat channel.
pub const HEARTBEAT_EVENT: &str = "shockping";

/// Event the server emits when the presented token is not accepted.
pub const NOT_AUTH_EVENT: &str = "NOT_AUTH";

/// Event carrying server-side error descriptions.
pub const ERROR_EVENT: &str = "$error";

/// Milliseconds without a heartbeat after which the heartbeat channel is dead.
pub const HEARTBEAT_TIMEOUT_MS: u64 = 12_000;

/// Default interval between watchdog evaluations.
pub const WATCHDOG_TICK_MS: u64 = 1_000;

/// Event names that travel in plaintext even when encryption is on.
///
/// These are bootstrap and handshake events that must work before a session
/// key has been negotiated.
pub const NON_ENCRYPTED_EVENTS: &[&str] = &[
    "connect",
    "disconnect",
    "ping",
    ERROR_EVENT,
    NOT_AUTH_EVENT,
    HEARTBEAT_EVENT,
    "IS_GUN_AUTH",
    "SET_LAST_SEEN_APP",
];

/// Server messages that mean the cached auth token is no longer usable.
pub const AUTH_INVALID_MESSAGES: &[&str] = &[
    "Token expired.",
    NOT_AUTH_EVENT,
    "secret or public key must be provided",
];
