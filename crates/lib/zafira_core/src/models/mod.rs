//! Domain models shared by the store implementations and the API layer.

pub mod auth;
