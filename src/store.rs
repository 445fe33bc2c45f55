//! Main SnippetStore tying all components together.

use crate::backup::BackupRotator;
use crate::codec::ItemCodec;
use crate::error::Result;
use crate::scheduler::{Scheduler, ThreadScheduler};
use crate::storage::{FileStorage, StorageAdapter};
use crate::subscribers::{Listener, SubscriberId, SubscriberRegistry};
use crate::types::{normalize_profile_name, AppState, BackupSnapshot, Item, ItemDraft, ItemId};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Quiet period before a debounced backup fires.
    pub backup_debounce: Duration,

    /// Maximum number of retained backup snapshots.
    pub max_backups: usize,

    /// Interval of the unconditional freshness backup.
    pub periodic_backup: Duration,

    /// Namespace prefix for persisted keys.
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backup_debounce: Duration::from_millis(200),
            max_backups: 10,
            periodic_backup: Duration::from_secs(60 * 60),
            key_prefix: "snipstash.".to_string(),
        }
    }
}

/// The snippet store.
///
/// Single source of truth for application data. Every mutation runs the
/// same chain on the calling thread: update in-memory state, persist the
/// affected slices, schedule a backup, notify subscribers with a snapshot.
/// Failed writes are logged and never propagate; the in-memory state stays
/// authoritative for the session.
pub struct SnippetStore {
    /// Store configuration.
    config: StoreConfig,

    /// Codec over the storage adapter.
    codec: Arc<ItemCodec>,

    /// In-memory state, shared read-only with the backup rotator.
    state: Arc<RwLock<AppState>>,

    /// Backup rotation.
    rotator: BackupRotator,

    /// Change listeners.
    subscribers: SubscriberRegistry<AppState>,

    /// Serializes mutation chains so each operation's effects land as a
    /// unit.
    write_lock: Mutex<()>,
}

impl SnippetStore {
    /// Open a file-backed store at `path` with a wall-clock scheduler,
    /// creating the directory if missing.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let storage = Arc::new(FileStorage::open(path)?);
        let scheduler = Arc::new(ThreadScheduler::new());
        Ok(Self::with_adapter(storage, scheduler, config))
    }

    /// Build a store over any adapter and scheduler. Hydrates state from
    /// storage and starts the periodic backup timer.
    pub fn with_adapter(
        storage: Arc<dyn StorageAdapter>,
        scheduler: Arc<dyn Scheduler>,
        config: StoreConfig,
    ) -> Self {
        let codec = Arc::new(ItemCodec::new(storage, config.key_prefix.clone()));

        // Hydrate from storage; malformed slices fall back to empty.
        let state = Arc::new(RwLock::new(AppState {
            items: codec.load_items(),
            filter_tags: codec.load_filter_tags(),
            search: String::new(),
            editing_id: None,
            profile_name: codec.load_profile_name(),
        }));

        let rotator = BackupRotator::new(
            Arc::clone(&codec),
            Arc::clone(&state),
            scheduler,
            config.backup_debounce,
            config.max_backups,
        );
        rotator.start_periodic(config.periodic_backup);

        Self {
            config,
            codec,
            state,
            rotator,
            subscribers: SubscriberRegistry::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // --- State Access ---

    /// Cloned snapshot of the current state. Mutating the returned value
    /// never affects the store.
    pub fn get_state(&self) -> AppState {
        self.state.read().clone()
    }

    /// Defensive read of the persisted backup sequence, newest first.
    pub fn backups(&self) -> Vec<BackupSnapshot> {
        self.codec.load_backups()
    }

    // --- Mutations ---

    /// Insert or update an item.
    ///
    /// With `editing_id` set, the present draft fields are merged over the
    /// matching item and `editing_id` is cleared. A stale `editing_id`
    /// (target deleted meanwhile) leaves the items untouched but still
    /// clears `editing_id`, abandoning the edit. With no `editing_id`, the
    /// draft becomes a new item under a fresh id, prepended so the newest
    /// comes first.
    pub fn upsert_item(&self, draft: ItemDraft) {
        let lock = self.write_lock.lock();

        let snapshot = {
            let mut state = self.state.write();

            match state.editing_id.take() {
                Some(editing_id) => {
                    if let Some(target) =
                        state.items.iter_mut().find(|item| item.id == editing_id)
                    {
                        draft.apply_to(target);
                    }
                }
                None => {
                    state.items.insert(0, draft.into_item(ItemId::generate()));
                }
            }

            state.clone()
        };

        self.persist_items(&snapshot.items);
        self.rotator.schedule();

        // Notify outside the chain lock so listeners can call back in.
        drop(lock);
        self.subscribers.notify(&snapshot);
    }

    /// Remove the item with the given id. Silently a no-op when absent;
    /// the persistence and notification chain still runs.
    pub fn delete_item(&self, id: &ItemId) {
        let lock = self.write_lock.lock();

        let snapshot = {
            let mut state = self.state.write();
            state.items.retain(|item| item.id != *id);
            state.clone()
        };

        self.persist_items(&snapshot.items);
        self.rotator.schedule();

        drop(lock);
        self.subscribers.notify(&snapshot);
    }

    /// Replace the active filter tags. Persisted immediately so filters
    /// survive a reload without waiting on any debounce.
    pub fn update_filter_tags(&self, tags: Vec<String>) {
        let lock = self.write_lock.lock();

        let snapshot = {
            let mut state = self.state.write();
            state.filter_tags = tags;
            state.clone()
        };

        if let Err(e) = self.codec.save_filter_tags(&snapshot.filter_tags) {
            warn!("filter write failed, keeping in-memory value: {}", e);
        }

        drop(lock);
        self.subscribers.notify(&snapshot);
    }

    /// Replace the search query. Session-only, never persisted.
    pub fn update_search(&self, query: impl Into<String>) {
        let lock = self.write_lock.lock();

        let snapshot = {
            let mut state = self.state.write();
            state.search = query.into();
            state.clone()
        };

        drop(lock);
        self.subscribers.notify(&snapshot);
    }

    /// Target an item for the next `upsert_item`, or clear the target.
    /// Session-only, never persisted.
    pub fn set_editing_id(&self, id: Option<ItemId>) {
        let lock = self.write_lock.lock();

        let snapshot = {
            let mut state = self.state.write();
            state.editing_id = id;
            state.clone()
        };

        drop(lock);
        self.subscribers.notify(&snapshot);
    }

    /// Replace the profile name, trimmed and truncated, and persist it.
    /// An empty result is kept in memory but never written over a stored
    /// name.
    pub fn update_profile(&self, name: &str) {
        let lock = self.write_lock.lock();

        let snapshot = {
            let mut state = self.state.write();
            state.profile_name = normalize_profile_name(name);
            state.clone()
        };

        if let Err(e) = self.codec.save_profile_name(&snapshot.profile_name) {
            warn!("profile write failed, keeping in-memory value: {}", e);
        }

        drop(lock);
        self.subscribers.notify(&snapshot);
    }

    // --- Subscriptions ---

    /// Register a change listener; it receives a state snapshot after
    /// every mutation. Registering the same `Arc` twice has no additional
    /// effect.
    pub fn subscribe(&self, listener: Arc<Listener<AppState>>) -> SubscriberId {
        self.subscribers.subscribe(listener)
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    // --- Backups ---

    /// Run any pending debounced backup immediately.
    pub fn flush_backup(&self) {
        self.rotator.flush();
    }

    // --- Private Helpers ---

    fn persist_items(&self, items: &[Item]) {
        if let Err(e) = self.codec.save_items(items) {
            warn!("item write failed, keeping in-memory value: {}", e);
        }
    }
}

impl Drop for SnippetStore {
    fn drop(&mut self) {
        // Best-effort flush of a pending backup
        self.rotator.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use crate::storage::MemoryStorage;

    struct Harness {
        storage: Arc<MemoryStorage>,
        scheduler: Arc<ManualScheduler>,
        store: SnippetStore,
    }

    fn test_store() -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let scheduler = Arc::new(ManualScheduler::new());
        let store = SnippetStore::with_adapter(
            storage.clone(),
            scheduler.clone(),
            StoreConfig::default(),
        );

        Harness {
            storage,
            scheduler,
            store,
        }
    }

    fn reopen(h: &Harness) -> SnippetStore {
        SnippetStore::with_adapter(
            h.storage.clone(),
            Arc::new(ManualScheduler::new()),
            StoreConfig::default(),
        )
    }

    fn draft(text: &str) -> ItemDraft {
        ItemDraft::new(text, "desc").with_tags(vec!["tag".to_string()])
    }

    #[test]
    fn test_starts_empty() {
        let h = test_store();
        let state = h.store.get_state();

        assert!(state.items.is_empty());
        assert!(state.filter_tags.is_empty());
        assert_eq!(state.search, "");
        assert_eq!(state.editing_id, None);
        assert_eq!(state.profile_name, "");
    }

    #[test]
    fn test_upsert_creates_with_fresh_id() {
        let h = test_store();

        h.store.upsert_item(draft("first"));
        h.store.upsert_item(draft("second"));

        let state = h.store.get_state();
        assert_eq!(state.items.len(), 2);
        // Newest first.
        assert_eq!(state.items[0].text, "second");
        assert_ne!(state.items[0].id, state.items[1].id);
    }

    #[test]
    fn test_upsert_updates_targeted_item() {
        let h = test_store();
        h.store.upsert_item(draft("original"));
        let id = h.store.get_state().items[0].id.clone();

        h.store.set_editing_id(Some(id.clone()));
        h.store
            .upsert_item(ItemDraft::default().with_desc("new desc"));

        let state = h.store.get_state();
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].id, id);
        assert_eq!(state.items[0].text, "original");
        assert_eq!(state.items[0].desc, "new desc");
        assert_eq!(state.editing_id, None);
    }

    #[test]
    fn test_stale_editing_id_abandons_edit() {
        let h = test_store();
        h.store.upsert_item(draft("kept"));

        h.store.set_editing_id(Some(ItemId::from("no-such-id")));
        h.store.upsert_item(ItemDraft::default().with_text("lost"));

        let state = h.store.get_state();
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].text, "kept");
        assert_eq!(state.editing_id, None);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let h = test_store();
        h.store.upsert_item(draft("one"));
        let id = h.store.get_state().items[0].id.clone();

        h.store.delete_item(&id);
        let after_first = h.store.get_state();

        h.store.delete_item(&id);
        assert_eq!(h.store.get_state(), after_first);
        assert!(after_first.items.is_empty());
    }

    #[test]
    fn test_items_and_filters_persist_across_reopen() {
        let h = test_store();
        h.store.upsert_item(draft("persisted"));
        h.store.update_filter_tags(vec!["git".to_string()]);

        let reopened = reopen(&h);
        let state = reopened.get_state();

        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].text, "persisted");
        assert_eq!(state.filter_tags, vec!["git".to_string()]);
    }

    #[test]
    fn test_search_and_editing_are_session_only() {
        let h = test_store();
        h.store.upsert_item(draft("one"));
        let id = h.store.get_state().items[0].id.clone();

        h.store.update_search("query");
        h.store.set_editing_id(Some(id));

        let reopened = reopen(&h);
        let state = reopened.get_state();
        assert_eq!(state.search, "");
        assert_eq!(state.editing_id, None);
    }

    #[test]
    fn test_profile_trimmed_and_persisted() {
        let h = test_store();
        h.store.update_profile("  Alice  ");

        assert_eq!(h.store.get_state().profile_name, "Alice");
        assert_eq!(reopen(&h).get_state().profile_name, "Alice");
    }

    #[test]
    fn test_empty_profile_never_clobbers_stored_name() {
        let h = test_store();
        h.store.update_profile("Alice");
        h.store.update_profile("   ");

        // In memory the name is cleared, but the stored value survives.
        assert_eq!(h.store.get_state().profile_name, "");
        assert_eq!(reopen(&h).get_state().profile_name, "Alice");
    }

    #[test]
    fn test_get_state_is_detached() {
        let h = test_store();
        h.store.upsert_item(draft("one"));

        let mut state = h.store.get_state();
        state.items.clear();
        state.profile_name = "mutated".to_string();

        assert_eq!(h.store.get_state().items.len(), 1);
        assert_eq!(h.store.get_state().profile_name, "");
    }

    #[test]
    fn test_every_mutation_notifies() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let h = test_store();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        h.store.subscribe(Arc::new(move |_state: &AppState| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        h.store.upsert_item(draft("one"));
        let id = h.store.get_state().items[0].id.clone();
        h.store.delete_item(&id);
        h.store.update_filter_tags(vec![]);
        h.store.update_search("q");
        h.store.set_editing_id(None);
        h.store.update_profile("Alice");

        assert_eq!(count.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_listener_sees_post_mutation_state() {
        let h = test_store();
        let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        h.store.subscribe(Arc::new(move |state: &AppState| {
            sink.lock().push(state.items.len());
        }));

        h.store.upsert_item(draft("one"));
        h.store.upsert_item(draft("two"));

        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_subscribe_same_arc_is_deduplicated() {
        let h = test_store();
        let listener: Arc<Listener<AppState>> = Arc::new(|_| {});

        let first = h.store.subscribe(Arc::clone(&listener));
        let second = h.store.subscribe(listener);

        assert_eq!(first, second);
    }

    #[test]
    fn test_item_mutations_schedule_backups() {
        let h = test_store();

        h.store.upsert_item(draft("one"));
        h.store.upsert_item(draft("two"));
        assert_eq!(h.scheduler.arm_count(), 2);
        assert!(h.store.backups().is_empty());

        assert!(h.scheduler.fire());
        let backups = h.store.backups();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].items.len(), 2);
    }

    #[test]
    fn test_filter_and_search_do_not_schedule_backups() {
        let h = test_store();

        h.store.update_filter_tags(vec!["git".to_string()]);
        h.store.update_search("q");
        h.store.update_profile("Alice");

        assert_eq!(h.scheduler.arm_count(), 0);
    }

    #[test]
    fn test_flush_backup_on_drop() {
        let storage = Arc::new(MemoryStorage::new());
        let scheduler = Arc::new(ManualScheduler::new());

        {
            let store = SnippetStore::with_adapter(
                storage.clone(),
                scheduler.clone(),
                StoreConfig::default(),
            );
            store.upsert_item(draft("unsaved burst"));
            // Dropped with the debounce still armed.
        }

        let reopened = SnippetStore::with_adapter(
            storage,
            Arc::new(ManualScheduler::new()),
            StoreConfig::default(),
        );
        let backups = reopened.backups();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].items[0].text, "unsaved burst");
    }
}
