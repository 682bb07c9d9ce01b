//! PostgreSQL storage implementation
//!
//! Suitable for multi-instance deployments sharing one database. Timestamps
//! are stored as `TIMESTAMPTZ`.

mod records;

pub use records::PostgresRecordStore;
