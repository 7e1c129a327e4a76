//! Settings type definitions.
//!
//! All types use camelCase JSON and `#[serde(default)]`, so a partial file
//! only has to name the values it changes.

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "node": { "host": "10.0.0.5:9835", "tls": false },
///   "liveness": { "heartbeatTimeoutMs": 12000 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShockSettings {
    /// Node endpoint settings.
    pub node: NodeSettings,
    /// Payload encryption settings.
    pub encryption: EncryptionSettings,
    /// Heartbeat watchdog settings.
    pub liveness: LivenessSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Where the Shock API node lives and how to reach it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeSettings {
    /// `host[:port]` of the node, without scheme.
    pub host: String,
    /// Use `wss://` instead of `ws://`.
    pub tls: bool,
    /// Device identifier sent on the data channel. Generated when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Path of the heartbeat endpoint relative to the host.
    pub heartbeat_path: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:9835".to_string(),
            tls: false,
            device_id: None,
            heartbeat_path: "shockping".to_string(),
        }
    }
}

impl NodeSettings {
    /// The configured device id, or a fresh random one.
    pub fn device_id_or_generate(&self) -> String {
        self.device_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::now_v7().to_string())
    }
}

/// Payload encryption settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncryptionSettings {
    /// Send and accept every payload in plaintext.
    pub disabled: bool,
    /// Event names added to the built-in plaintext allow-list.
    pub plain_events: Vec<String>,
}

/// Heartbeat watchdog timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LivenessSettings {
    /// Milliseconds without a heartbeat before the channel is considered dead.
    pub heartbeat_timeout_ms: u64,
    /// Milliseconds between scheduled evaluations.
    pub tick_interval_ms: u64,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            heartbeat_timeout_ms: 12_000,
            tick_interval_ms: 1_000,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive, e.g. `info` or `shock_transport=debug`.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_serialize_camel_case() {
        let json = serde_json::to_value(ShockSettings::default()).unwrap();
        assert_eq!(json["node"]["host"], "127.0.0.1:9835");
        assert_eq!(json["node"]["heartbeatPath"], "shockping");
        assert!(json["node"].get("deviceId").is_none());
        assert_eq!(json["liveness"]["heartbeatTimeoutMs"], 12_000);
        assert_eq!(json["encryption"]["plainEvents"], json!([]));
    }

    #[test]
    fn partial_section_fills_defaults() {
        let settings: ShockSettings =
            serde_json::from_value(json!({"liveness": {"tickIntervalMs": 250}})).unwrap();
        assert_eq!(settings.liveness.tick_interval_ms, 250);
        assert_eq!(settings.liveness.heartbeat_timeout_ms, 12_000);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn configured_device_id_is_kept() {
        let node = NodeSettings {
            device_id: Some("dev-1".into()),
            ..NodeSettings::default()
        };
        assert_eq!(node.device_id_or_generate(), "dev-1");
    }

    #[test]
    fn generated_device_ids_differ() {
        let node = NodeSettings::default();
        assert_ne!(node.device_id_or_generate(), node.device_id_or_generate());
    }
}
