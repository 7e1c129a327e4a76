//! # shock-events
//!
//! Subscriptions to the node's data events:
//!
//! - [`ListenerRegistry`]: ordered listeners for one event kind with
//!   duplicate and unknown-unsubscribe detection
//! - [`Subscription`]: the capability to remove one registration, carrying
//!   the cancellation token deferred work checks
//! - [`EventHub`]: all registries, fetch-on-subscribe, replay-on-connect,
//!   action emission and the auth-invalidation rule, wired onto an
//!   [`EventSocket`](shock_transport::EventSocket)
//!
//! ## Crate Position
//!
//! Depends on `shock-core` and `shock-transport`.

#![deny(unsafe_code)]

pub mod hub;
pub mod registry;

pub use hub::EventHub;
pub use registry::{Listener, ListenerRegistry, Subscription};
