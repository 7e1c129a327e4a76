//! # shock-core
//!
//! Foundation types shared by every Shock socket crate:
//!
//! - **Errors**: [`errors::ShockError`] taxonomy plus [`errors::CryptoError`]
//!   and [`errors::TransportError`] via `thiserror`
//! - **Event kinds**: [`events::Event`] (data-fetch family) and
//!   [`events::Action`] (user-initiated), both closed enumerations with wire names
//! - **Wire emission**: [`events::Emission`] (`{ ok, msg }`) and the typed
//!   [`events::EventPayload`] decoded from it
//! - **Schema**: chats, requests and users carried by the data events
//! - **Auth**: [`auth::CredentialStore`] contract and the auth-invalidation rule
//! - **Logging**: [`logging::init_subscriber`] and a capture layer for tests
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other shock crates.

#![deny(unsafe_code)]

pub mod auth;
pub mod constants;
pub mod errors;
pub mod events;
pub mod logging;
pub mod schema;

pub use errors::{CryptoError, ShockError, TransportError};
