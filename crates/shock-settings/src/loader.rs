//! Layered settings resolution.
//!
//! Compiled defaults come first. `~/.shock/settings.json`, when present, is
//! overlaid on them key by key. `SHOCK_*` variables win over both. The
//! result is validated before it is handed out.
//!
//! Overlay rules: nested objects recurse, anything else in the file
//! replaces the default outright, and an explicit `null` leaves the
//! default untouched.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::ShockSettings;

/// Accepted range for `SHOCK_HEARTBEAT_TIMEOUT_MS`.
const HEARTBEAT_TIMEOUT_RANGE: (u64, u64) = (1_000, 600_000);
/// Accepted range for `SHOCK_TICK_INTERVAL_MS`.
const TICK_INTERVAL_RANGE: (u64, u64) = (50, 60_000);

/// `~/.shock/settings.json`, falling back to `/tmp` without `HOME`.
pub fn settings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
        .join(".shock")
        .join("settings.json")
}

/// Resolve settings from [`settings_path`] and the environment.
pub fn load_settings() -> Result<ShockSettings> {
    load_settings_from_path(&settings_path())
}

/// Resolve settings from `path` and the environment.
///
/// A missing file means defaults. A file that is not JSON, or that yields
/// invalid settings, is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ShockSettings> {
    let mut resolved = serde_json::to_value(ShockSettings::default())?;

    match std::fs::read_to_string(path) {
        Ok(raw) => {
            debug!(path = %path.display(), "overlaying settings file");
            let overlay: Value = serde_json::from_str(&raw)?;
            merge_into(&mut resolved, overlay);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
        }
        Err(e) => return Err(e.into()),
    }

    let mut settings: ShockSettings = serde_json::from_value(resolved)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Overlay `source` on `target` and return the result.
pub fn deep_merge(mut target: Value, source: Value) -> Value {
    merge_into(&mut target, source);
    target
}

fn merge_into(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay.into_iter().filter(|(_, v)| !v.is_null()) {
                match base.get_mut(&key) {
                    Some(slot) => merge_into(slot, value),
                    None => {
                        let _ = base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `SHOCK_*` variables. Unparseable values are logged and skipped.
pub fn apply_env_overrides(settings: &mut ShockSettings) {
    if let Some(host) = env_override("SHOCK_HOST", non_empty) {
        settings.node.host = host;
    }
    if let Some(tls) = env_override("SHOCK_TLS", parse_bool) {
        settings.node.tls = tls;
    }
    if let Some(id) = env_override("SHOCK_DEVICE_ID", non_empty) {
        settings.node.device_id = Some(id);
    }
    if let Some(off) = env_override("SHOCK_DISABLE_ENCRYPTION", parse_bool) {
        settings.encryption.disabled = off;
    }

    let (lo, hi) = HEARTBEAT_TIMEOUT_RANGE;
    if let Some(ms) = env_override("SHOCK_HEARTBEAT_TIMEOUT_MS", |v| parse_u64_range(v, lo, hi)) {
        settings.liveness.heartbeat_timeout_ms = ms;
    }
    let (lo, hi) = TICK_INTERVAL_RANGE;
    if let Some(ms) = env_override("SHOCK_TICK_INTERVAL_MS", |v| parse_u64_range(v, lo, hi)) {
        settings.liveness.tick_interval_ms = ms;
    }

    if let Some(level) = env_override("SHOCK_LOG_LEVEL", non_empty) {
        settings.logging.level = level;
    }
}

/// Reject settings that cannot drive a working client.
pub fn validate(settings: &ShockSettings) -> Result<()> {
    let host = settings.node.host.trim();
    if host.is_empty() {
        return Err(SettingsError::InvalidValue("node.host is empty".into()));
    }
    if host.contains("://") {
        return Err(SettingsError::InvalidValue(format!(
            "node.host must not carry a scheme: {host}"
        )));
    }
    for (name, value) in [
        ("liveness.heartbeatTimeoutMs", settings.liveness.heartbeat_timeout_ms),
        ("liveness.tickIntervalMs", settings.liveness.tick_interval_ms),
    ] {
        if value == 0 {
            return Err(SettingsError::InvalidValue(format!("{name} must be positive")));
        }
    }
    Ok(())
}

/// `true`/`yes`/`on`/`1` or `false`/`no`/`off`/`0`, any case.
pub fn parse_bool(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    let is = |words: &[&str]| words.iter().any(|w| raw.eq_ignore_ascii_case(w));
    if is(&["true", "yes", "on", "1"]) {
        Some(true)
    } else if is(&["false", "no", "off", "0"]) {
        Some(false)
    } else {
        None
    }
}

/// A `u64` in `min..=max`.
pub fn parse_u64_range(raw: &str, min: u64, max: u64) -> Option<u64> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|n| (min..=max).contains(n))
}

fn non_empty(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_owned())
}

fn env_override<T>(name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    let parsed = parse(&raw);
    if parsed.is_none() && !raw.is_empty() {
        warn!(var = name, value = %raw, "ignoring unparseable environment override");
    }
    parsed
}
