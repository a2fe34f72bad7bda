//! # zafira_core
//!
//! Core domain logic for Zafira: accounts, credentials, session tokens,
//! e-mail verification and federated identity.

pub mod auth;
pub mod email;
pub mod migrate;
pub mod models;
pub mod oauth;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
