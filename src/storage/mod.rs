//! Trait-based storage abstractions with in-memory, SQLite, and PostgreSQL backends.

pub mod inmemory;
pub mod records;
pub mod traits;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

// Feature-gated storage implementations
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use inmemory::MemoryRecordStore;
pub use records::RecordStore;
pub use traits::*;

use crate::errors::StorageError;
use std::sync::Arc;

/// Storage backend configuration and factory
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    #[cfg(feature = "sqlite")]
    Sqlite(String), // Connection string/path
    #[cfg(feature = "postgres")]
    Postgres(String), // Connection string
}

/// Create a record store based on configuration
pub async fn create_storage_backend(
    backend: StorageBackend,
) -> std::result::Result<Arc<dyn RecordStore>, StorageError> {
    match backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryRecordStore::new())),
        #[cfg(feature = "sqlite")]
        StorageBackend::Sqlite(database_url) => {
            // A pooled `:memory:` URL would hand every connection its own database
            let store = if database_url == "sqlite::memory:" {
                sqlite::SqliteRecordStore::in_memory().await?
            } else {
                sqlite::SqliteRecordStore::connect(&database_url).await?
            };
            Ok(Arc::new(store))
        }
        #[cfg(feature = "postgres")]
        StorageBackend::Postgres(database_url) => {
            let store = postgres::PostgresRecordStore::connect(&database_url).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Parse storage backend from configuration string
pub fn parse_storage_backend(
    backend_name: &str,
    database_url: Option<&str>,
) -> std::result::Result<StorageBackend, StorageError> {
    match backend_name {
        "memory" => Ok(StorageBackend::Memory),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let url = database_url.unwrap_or("sqlite:credstore.db");
            Ok(StorageBackend::Sqlite(url.to_string()))
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            let url = database_url.ok_or_else(|| {
                StorageError::InvalidData("DATABASE_URL required for postgres backend".to_string())
            })?;
            Ok(StorageBackend::Postgres(url.to_string()))
        }
        _ => Err(StorageError::InvalidData(format!(
            "Unknown storage backend: {}",
            backend_name
        ))),
    }
}
