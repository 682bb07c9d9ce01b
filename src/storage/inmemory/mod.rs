//! In-memory storage implementation
//!
//! Suitable for development and testing. Nothing survives the process.

mod records;

pub use records::MemoryRecordStore;
