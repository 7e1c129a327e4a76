//! Errors from settings resolution.

use thiserror::Error;

/// Why settings could not be resolved.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file, or the merged result, is not valid settings JSON.
    #[error("malformed settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A resolved value cannot drive the client.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Settings result alias.
pub type Result<T> = std::result::Result<T, SettingsError>;
