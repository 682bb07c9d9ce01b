//! Standardized error types following the `error-credstore-<domain>-<number>` format.

use thiserror::Error;

/// Configuration errors raised while building store or backend settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when a required environment variable is not set
    #[error("error-credstore-config-1 {0} must be set")]
    EnvVarRequired(String),

    /// Error when duration string cannot be parsed
    #[error("error-credstore-config-2 Failed to parse duration '{0}': {1}")]
    DurationParsingFailed(String, String),

    /// Error when a table name is not a plain SQL identifier
    #[error(
        "error-credstore-config-3 Invalid table name '{0}': expected letters, digits, and underscores"
    )]
    InvalidTableName(String),

    /// Error when the reclamation interval is zero
    #[error("error-credstore-config-4 Reclaim interval must be greater than zero")]
    ZeroInterval,
}

/// Database/storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Error when database connection fails
    #[error("error-credstore-storage-1 Database connection failed: {0}")]
    ConnectionFailed(String),

    /// Error when requested record is not found
    #[error("error-credstore-storage-2 Not found: {0}")]
    NotFound(String),

    /// Error when an insert collides with an existing primary key
    #[error("error-credstore-storage-3 Duplicate key: {0}")]
    DuplicateKey(String),

    /// Error when a payload cannot be encoded
    #[error("error-credstore-storage-4 Data serialization failed: {0}")]
    SerializationFailed(String),

    /// Error when a stored payload cannot be decoded
    #[error("error-credstore-storage-5 Corrupt record: {0}")]
    CorruptRecord(String),

    /// Error when the underlying storage engine fails
    #[error("error-credstore-storage-6 Storage failure: {0}")]
    StorageFailure(String),

    /// Error when data validation fails
    #[error("error-credstore-storage-7 Invalid data: {0}")]
    InvalidData(String),
}

impl StorageError {
    /// Returns true for the `NotFound` variant
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// Returns true for the `DuplicateKey` variant
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StorageError::DuplicateKey(_))
    }
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StorageError::DuplicateKey(db_err.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::ConnectionFailed(err.to_string())
            }
            _ => StorageError::StorageFailure(err.to_string()),
        }
    }
}
