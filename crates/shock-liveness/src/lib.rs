//! # shock-liveness
//!
//! [`LivenessWatchdog`] keeps a second, independent heartbeat channel to the
//! node and rebuilds it when the server stops sending heartbeats or the auth
//! token goes away.
//!
//! ## Crate Position
//!
//! Depends on `shock-core`, `shock-settings` and `shock-transport`.

#![deny(unsafe_code)]

pub mod watchdog;

pub use watchdog::{Evaluation, LivenessWatchdog, WatchdogConfig};
