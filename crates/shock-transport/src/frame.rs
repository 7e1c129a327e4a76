//! JSON text frame carried by the WebSocket transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One named event on the wire: `{"event": "<name>", "data": <json>}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Event name.
    pub event: String,
    /// Payload; `null` when absent.
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    /// Build a frame.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Serialize to frame text.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse frame text.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_event_and_data() {
        let text = Frame::new("ON_CHATS", json!({"token": "t"})).encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"event": "ON_CHATS", "data": {"token": "t"}}));
    }

    #[test]
    fn missing_data_is_null() {
        let frame = Frame::decode(r#"{"event":"shockping"}"#).unwrap();
        assert_eq!(frame.event, "shockping");
        assert!(frame.data.is_null());
    }

    #[test]
    fn missing_event_is_rejected() {
        assert!(Frame::decode(r#"{"data":1}"#).is_err());
        assert!(Frame::decode("shockping").is_err());
    }
}
