//! (De)serialization of persisted slices, with defensive loading.
//!
//! Decoding is split in two layers. The `decode_*` functions are pure and
//! tagged: a whole-value failure (malformed JSON, wrong top-level shape)
//! comes back as a `Deserialization` error with the reason, while element
//! failures are dropped and counted. `ItemCodec` sits on top of a storage
//! adapter, chooses the empty fallback for failed loads, and does the
//! logging; its `load_*` methods never fail.

use crate::error::{Result, StoreError};
use crate::storage::StorageAdapter;
use crate::types::{normalize_profile_name, BackupSnapshot, Item};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Key suffixes for the persisted slices. The full key is the store's
/// configured prefix followed by one of these.
pub mod keys {
    /// JSON array of items.
    pub const ITEMS: &str = "items";
    /// JSON array of filter tags.
    pub const FILTERS: &str = "filters";
    /// Plain trimmed profile name.
    pub const PROFILE: &str = "profile";
    /// JSON array of backup snapshots, newest first.
    pub const BACKUPS: &str = "backups";
}

/// Elements that survived decoding, in original relative order, plus the
/// count that did not.
#[derive(Debug, PartialEq)]
pub struct Decoded<T> {
    pub kept: Vec<T>,
    pub dropped: usize,
}

/// Decode a stored item array.
///
/// Elements failing the item shape invariant are dropped and counted; the
/// rest keep their relative order.
pub fn decode_items(raw: &str) -> Result<Decoded<Item>> {
    decode_array(raw, |entry| {
        serde_json::from_value::<Item>(entry)
            .ok()
            .filter(|item| item.is_valid())
    })
}

/// Decode a stored string array; non-string entries are dropped.
pub fn decode_string_list(raw: &str) -> Result<Decoded<String>> {
    decode_array(raw, |entry| match entry {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Decode a stored backup array; malformed snapshot entries are dropped.
pub fn decode_backups(raw: &str) -> Result<Decoded<BackupSnapshot>> {
    decode_array(raw, |entry| serde_json::from_value(entry).ok())
}

fn decode_array<T, F>(raw: &str, keep: F) -> Result<Decoded<T>>
where
    F: Fn(Value) -> Option<T>,
{
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| StoreError::Deserialization(e.to_string()))?;

    let entries = match value {
        Value::Array(entries) => entries,
        other => {
            return Err(StoreError::Deserialization(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            )))
        }
    };

    let total = entries.len();
    let kept: Vec<T> = entries.into_iter().filter_map(keep).collect();
    let dropped = total - kept.len();

    Ok(Decoded { kept, dropped })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Codec over a storage adapter.
pub struct ItemCodec {
    storage: Arc<dyn StorageAdapter>,
    key_prefix: String,
}

impl ItemCodec {
    pub fn new(storage: Arc<dyn StorageAdapter>, key_prefix: impl Into<String>) -> Self {
        Self {
            storage,
            key_prefix: key_prefix.into(),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}{}", self.key_prefix, suffix)
    }

    /// Read a raw value; read failures degrade to absent.
    fn read_raw(&self, key: &str) -> Option<String> {
        match self.storage.read(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("storage read of {} failed: {}", key, e);
                None
            }
        }
    }

    // --- Loads (defensive, never fail) ---

    /// Load the item collection; missing or malformed data yields empty.
    pub fn load_items(&self) -> Vec<Item> {
        let key = self.key(keys::ITEMS);
        let raw = match self.read_raw(&key) {
            Some(raw) => raw,
            None => return Vec::new(),
        };

        match decode_items(&raw) {
            Ok(decoded) => {
                if decoded.dropped > 0 {
                    warn!("dropped {} malformed items from {}", decoded.dropped, key);
                }
                decoded.kept
            }
            Err(e) => {
                warn!("stored items unreadable ({}), starting empty: {}", key, e);
                Vec::new()
            }
        }
    }

    /// Load the filter-tag list; missing or malformed data yields empty.
    pub fn load_filter_tags(&self) -> Vec<String> {
        let key = self.key(keys::FILTERS);
        let raw = match self.read_raw(&key) {
            Some(raw) => raw,
            None => return Vec::new(),
        };

        match decode_string_list(&raw) {
            Ok(decoded) => {
                if decoded.dropped > 0 {
                    warn!("dropped {} non-string tags from {}", decoded.dropped, key);
                }
                decoded.kept
            }
            Err(e) => {
                warn!("stored filters unreadable ({}), starting empty: {}", key, e);
                Vec::new()
            }
        }
    }

    /// Load the profile name: raw value trimmed and truncated. Absent
    /// yields empty.
    pub fn load_profile_name(&self) -> String {
        match self.read_raw(&self.key(keys::PROFILE)) {
            Some(raw) => normalize_profile_name(&raw),
            None => String::new(),
        }
    }

    /// Load the backup sequence; missing or malformed data yields empty.
    pub fn load_backups(&self) -> Vec<BackupSnapshot> {
        let key = self.key(keys::BACKUPS);
        let raw = match self.read_raw(&key) {
            Some(raw) => raw,
            None => return Vec::new(),
        };

        match decode_backups(&raw) {
            Ok(decoded) => {
                if decoded.dropped > 0 {
                    warn!("dropped {} malformed backups from {}", decoded.dropped, key);
                }
                decoded.kept
            }
            Err(e) => {
                warn!("stored backups unreadable ({}), starting empty: {}", key, e);
                Vec::new()
            }
        }
    }

    // --- Saves ---

    /// Serialize and write the item collection.
    pub fn save_items(&self, items: &[Item]) -> Result<()> {
        let payload = serde_json::to_string(items)?;
        self.storage.write(&self.key(keys::ITEMS), &payload)
    }

    /// Serialize and write the filter-tag list.
    pub fn save_filter_tags(&self, tags: &[String]) -> Result<()> {
        let payload = serde_json::to_string(tags)?;
        self.storage.write(&self.key(keys::FILTERS), &payload)
    }

    /// Write the profile name. Empty values are skipped so an empty
    /// in-memory name never overwrites a stored one.
    pub fn save_profile_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }
        self.storage.write(&self.key(keys::PROFILE), name)
    }

    /// Serialize and write the backup sequence.
    pub fn save_backups(&self, backups: &[BackupSnapshot]) -> Result<()> {
        let payload = serde_json::to_string(backups)?;
        self.storage.write(&self.key(keys::BACKUPS), &payload)
    }
}
