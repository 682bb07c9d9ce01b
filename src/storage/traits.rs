//! Store capabilities consumed by an authorization server.
//!
//! Lookups share one convention: an empty key yields `Ok(None)`, a non-empty
//! key with no matching record yields `StorageError::NotFound`.

use crate::errors::StorageError;
use crate::oauth::types::{ClientRecord, TokenMetadata};
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Trait for storing and retrieving client registrations
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Store a new client; `DuplicateKey` when the id is taken
    async fn create(&self, client: &ClientRecord) -> Result<()>;

    /// Retrieve a client by ID
    async fn get_by_id(&self, id: &str) -> Result<Option<ClientRecord>>;
}

/// Trait for storing and retrieving issued tokens
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Store newly issued token metadata as one record
    async fn create(&self, token: &TokenMetadata) -> Result<()>;

    /// Retrieve token metadata by authorization code
    async fn get_by_code(&self, code: &str) -> Result<Option<TokenMetadata>>;

    /// Retrieve token metadata by access token
    async fn get_by_access(&self, access: &str) -> Result<Option<TokenMetadata>>;

    /// Retrieve token metadata by refresh token
    async fn get_by_refresh(&self, refresh: &str) -> Result<Option<TokenMetadata>>;

    /// Remove the record holding this authorization code
    async fn remove_by_code(&self, code: &str) -> Result<()>;

    /// Remove the record holding this access token
    async fn remove_by_access(&self, access: &str) -> Result<()>;

    /// Remove the record holding this refresh token
    async fn remove_by_refresh(&self, refresh: &str) -> Result<()>;
}
