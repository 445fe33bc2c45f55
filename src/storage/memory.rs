//! In-memory storage backend.

use super::StorageAdapter;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;

/// HashMap-backed storage for tests and ephemeral hosts. Never fails;
/// contents vanish with the value.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl StorageAdapter for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.read("anything").unwrap(), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let storage = MemoryStorage::new();
        storage.write("key", "value").unwrap();
        assert_eq!(storage.read("key").unwrap().as_deref(), Some("value"));
    }

    #[test]
    fn test_overwrites_previous() {
        let storage = MemoryStorage::new();
        storage.write("key", "first").unwrap();
        storage.write("key", "second").unwrap();
        assert_eq!(storage.read("key").unwrap().as_deref(), Some("second"));
        assert_eq!(storage.len(), 1);
    }
}
