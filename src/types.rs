//! Core types for the snippet store.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum length of `Item::text`, in characters.
pub const MAX_TEXT_LEN: usize = 500;

/// Maximum length of `Item::desc`, in characters.
pub const MAX_DESC_LEN: usize = 500;

/// Maximum length of the profile name after trimming, in characters.
pub const MAX_PROFILE_LEN: usize = 100;

/// Unique identifier for an item.
///
/// Opaque to callers: assigned once at creation and immutable thereafter.
/// Serializes as a plain JSON string.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

/// Counter mixed into generated ids so two ids from the same microsecond
/// still differ.
static NEXT_ID_SEED: AtomicU64 = AtomicU64::new(0);

impl ItemId {
    /// Generate a fresh, previously unseen id.
    pub fn generate() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_micros();
        let seed = NEXT_ID_SEED.fetch_add(1, Ordering::SeqCst);

        let mut hasher = Sha256::new();
        hasher.update((micros as u64).to_le_bytes());
        hasher.update(seed.to_le_bytes());
        let digest = hasher.finalize();

        ItemId(hex::encode(&digest[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({})", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        ItemId(s)
    }
}

/// One stored snippet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier (assigned by the store).
    pub id: ItemId,

    /// Primary content. Non-empty, at most `MAX_TEXT_LEN` characters.
    pub text: String,

    /// Human-readable description. Non-empty, at most `MAX_DESC_LEN` characters.
    pub desc: String,

    /// When true, consuming UIs must mask `text` on display. The store
    /// itself never encrypts or redacts.
    #[serde(default)]
    pub sensitive: bool,

    /// Ordered tags. Duplicates round-trip as given.
    pub tags: Vec<String>,
}

impl Item {
    /// Shape invariant enforced on load: non-empty text and desc within
    /// their length limits. Items failing this are dropped, never repaired.
    pub fn is_valid(&self) -> bool {
        !self.text.is_empty()
            && self.text.chars().count() <= MAX_TEXT_LEN
            && !self.desc.is_empty()
            && self.desc.chars().count() <= MAX_DESC_LEN
    }
}

/// Partial item payload for `upsert_item`.
///
/// Fields left `None` keep the existing value when updating an item, or
/// default to empty/false when a new item is created.
#[derive(Clone, Debug, Default)]
pub struct ItemDraft {
    pub text: Option<String>,
    pub desc: Option<String>,
    pub sensitive: Option<bool>,
    pub tags: Option<Vec<String>>,
}

impl ItemDraft {
    /// Draft with text and description set.
    pub fn new(text: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            desc: Some(desc.into()),
            sensitive: None,
            tags: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    pub fn with_sensitive(mut self, sensitive: bool) -> Self {
        self.sensitive = Some(sensitive);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Materialize a new item under the given id; absent fields become
    /// empty/false.
    pub fn into_item(self, id: ItemId) -> Item {
        Item {
            id,
            text: self.text.unwrap_or_default(),
            desc: self.desc.unwrap_or_default(),
            sensitive: self.sensitive.unwrap_or_default(),
            tags: self.tags.unwrap_or_default(),
        }
    }

    /// Merge the present fields over an existing item, leaving its id and
    /// any absent fields untouched.
    pub fn apply_to(self, item: &mut Item) {
        if let Some(text) = self.text {
            item.text = text;
        }
        if let Some(desc) = self.desc {
            item.desc = desc;
        }
        if let Some(sensitive) = self.sensitive {
            item.sensitive = sensitive;
        }
        if let Some(tags) = self.tags {
            item.tags = tags;
        }
    }
}

/// The single in-memory source of truth.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppState {
    /// Stored items; insertion order is display order (newest first by
    /// caller convention).
    pub items: Vec<Item>,

    /// Tags currently active as an AND-filter.
    pub filter_tags: Vec<String>,

    /// Free-text query. Session-only, never persisted.
    pub search: String,

    /// Item currently targeted for update. Session-only, never persisted.
    pub editing_id: Option<ItemId>,

    /// Display name, at most `MAX_PROFILE_LEN` characters after trimming.
    pub profile_name: String,
}

/// A point-in-time copy of the item collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    /// RFC3339 UTC creation time; display value and newest-first sort key.
    pub ts: String,

    /// Full copy of the items at snapshot time.
    pub items: Vec<Item>,
}

impl BackupSnapshot {
    /// Snapshot the given items at the current time.
    pub fn capture(items: Vec<Item>) -> Self {
        Self {
            ts: backup_timestamp(),
            items,
        }
    }
}

/// Current time as an RFC3339 UTC string with millisecond precision.
///
/// Fixed width and zero offset, so lexicographic order matches time order.
pub fn backup_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Trim surrounding whitespace and truncate to `MAX_PROFILE_LEN` characters.
pub fn normalize_profile_name(raw: &str) -> String {
    raw.trim().chars().take(MAX_PROFILE_LEN).collect()
}
