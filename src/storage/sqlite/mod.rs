//! SQLite storage implementation
//!
//! Suitable for single-instance deployments and development. Timestamps are
//! stored as RFC 3339 UTC text with fixed microsecond precision, so text order
//! equals time order and `<=` comparisons in SQL stay correct.

mod records;

pub use records::SqliteRecordStore;
