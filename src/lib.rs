//! # Snippet Store
//!
//! A personal snippet store: short text items with tags and descriptions,
//! persisted in a durable key-value store with rotating backups and change
//! subscriptions.
//!
//! ## Core Concepts
//!
//! - **Items**: Snippet records with text, description, sensitivity flag, and tags
//! - **Store**: The single in-memory source of truth; every mutation persists,
//!   schedules a backup, and notifies subscribers
//! - **Backups**: Debounced, timestamped snapshots of the item collection,
//!   rotated to a configurable maximum
//! - **Subscriptions**: Deduplicated change listeners receiving immutable
//!   state snapshots
//!
//! ## Example
//!
//! ```ignore
//! use snipstash::{ItemDraft, SnippetStore, StoreConfig};
//!
//! let store = SnippetStore::open("./my-snippets", StoreConfig::default())?;
//!
//! // Capture a snippet
//! store.upsert_item(
//!     ItemDraft::new("git status", "check working tree")
//!         .with_tags(vec!["git".to_string()]),
//! );
//!
//! // Watch for changes
//! let id = store.subscribe(std::sync::Arc::new(|state| {
//!     println!("{} items", state.items.len());
//! }));
//! ```

pub mod backup;
pub mod codec;
pub mod error;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod subscribers;
pub mod types;

// Re-exports
pub use backup::BackupRotator;
pub use codec::{decode_backups, decode_items, decode_string_list, Decoded, ItemCodec};
pub use error::{Result, StoreError};
pub use scheduler::{ManualScheduler, RepeatingTask, Scheduler, Task, ThreadScheduler};
pub use storage::{FileStorage, MemoryStorage, StorageAdapter};
pub use store::{SnippetStore, StoreConfig};
pub use subscribers::{Listener, SubscriberId, SubscriberRegistry};
pub use types::*;
