//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements outbound port traits. Production deployments bring their own
//! `RecordStore` over the host database.

mod memory_store;

pub use memory_store::InMemoryRecordStore;
