//! Adapters implementing the domain ports.

pub mod in_memory;
pub mod jsonl;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod sleeper;
