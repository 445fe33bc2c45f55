//! Durable key-value storage backends.
//!
//! Values are opaque strings; backends know nothing about item shape. Keys
//! are written independently, so a failure on one key never blocks writes
//! to others.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::Result;

/// Boundary abstraction over the durable key-value store.
pub trait StorageAdapter: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` under `key`, replacing any previous value.
    fn write(&self, key: &str, value: &str) -> Result<()>;
}
