//! # shock-settings
//!
//! Client settings resolved from compiled defaults, then
//! `~/.shock/settings.json`, then `SHOCK_*` environment variables. Later
//! layers win.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
