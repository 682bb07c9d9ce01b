//! OAuth2 credential persistence library crate.
//!
//! Stores registered clients and issued tokens on a pluggable record store,
//! with background reclamation of expired tokens.

pub mod config;
pub mod errors;
pub mod oauth;
pub mod reporting;
pub mod storage;
