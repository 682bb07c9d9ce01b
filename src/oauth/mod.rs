//! OAuth2 credential persistence: client registrations and issued tokens.
//!
//! Both stores sit on a shared [`RecordStore`](crate::storage::records::RecordStore)
//! and may share one backend while using separate tables.

pub mod client_registry;
pub mod credential_store;
pub mod reclaimer;
pub mod types;

pub use client_registry::ClientRegistry;
pub use credential_store::CredentialStore;
pub use reclaimer::ExpiryReclaimer;
pub use types::{ClientRecord, IssuedSecret, TokenMetadata};
