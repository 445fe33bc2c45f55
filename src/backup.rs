//! Debounced backup rotation.

use crate::codec::ItemCodec;
use crate::scheduler::Scheduler;
use crate::types::{AppState, BackupSnapshot};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Schedules and writes rotating snapshots of the item collection.
///
/// `schedule` coalesces bursts of mutations into one snapshot per quiet
/// period; the periodic timer registered by `start_periodic` snapshots
/// unconditionally. Nothing here ever fails the caller: backup problems
/// are logged and swallowed.
pub struct BackupRotator {
    codec: Arc<ItemCodec>,
    state: Arc<RwLock<AppState>>,
    scheduler: Arc<dyn Scheduler>,
    debounce: Duration,
    max_backups: usize,
    /// True while a debounced snapshot is armed (Pending), false when Idle.
    pending: Arc<AtomicBool>,
}

impl BackupRotator {
    pub fn new(
        codec: Arc<ItemCodec>,
        state: Arc<RwLock<AppState>>,
        scheduler: Arc<dyn Scheduler>,
        debounce: Duration,
        max_backups: usize,
    ) -> Self {
        Self {
            codec,
            state,
            scheduler,
            debounce,
            max_backups,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Arm (or re-arm) the debounced snapshot. Only the last call in a
    /// burst fires.
    pub fn schedule(&self) {
        self.pending.store(true, Ordering::SeqCst);

        let codec = Arc::clone(&self.codec);
        let state = Arc::clone(&self.state);
        let pending = Arc::clone(&self.pending);
        let max_backups = self.max_backups;

        self.scheduler.arm(
            self.debounce,
            Box::new(move || {
                pending.store(false, Ordering::SeqCst);
                create_backup(&codec, &state, max_backups);
            }),
        );
    }

    /// Register the periodic freshness timer. It snapshots regardless of
    /// the debounce state, so backups stay current even without edits.
    pub fn start_periodic(&self, period: Duration) {
        let codec = Arc::clone(&self.codec);
        let state = Arc::clone(&self.state);
        let max_backups = self.max_backups;

        self.scheduler.repeat(
            period,
            Box::new(move || {
                create_backup(&codec, &state, max_backups);
            }),
        );
    }

    /// Run a pending snapshot now instead of waiting out the debounce.
    /// No-op when nothing is pending.
    pub fn flush(&self) {
        if self.pending.swap(false, Ordering::SeqCst) {
            self.scheduler.cancel();
            create_backup(&self.codec, &self.state, self.max_backups);
        }
    }

    /// Whether a debounced snapshot is armed.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Snapshot current items, rotate in, truncate, persist. Failures are
/// logged and swallowed; a failed backup never blocks the foreground save.
fn create_backup(codec: &ItemCodec, state: &RwLock<AppState>, max_backups: usize) {
    let snapshot = BackupSnapshot::capture(state.read().items.clone());

    let mut backups = codec.load_backups();
    backups.insert(0, snapshot);
    backups.truncate(max_backups);

    if let Err(e) = codec.save_backups(&backups) {
        warn!("backup write failed: {}", e);
        return;
    }

    debug!("backup created, {} retained", backups.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, StoreError};
    use crate::scheduler::ManualScheduler;
    use crate::storage::{MemoryStorage, StorageAdapter};
    use crate::types::{Item, ItemId};

    fn item(text: &str) -> Item {
        Item {
            id: ItemId::generate(),
            text: text.to_string(),
            desc: "desc".to_string(),
            sensitive: false,
            tags: Vec::new(),
        }
    }

    struct Harness {
        scheduler: Arc<ManualScheduler>,
        state: Arc<RwLock<AppState>>,
        codec: Arc<ItemCodec>,
        rotator: BackupRotator,
    }

    fn harness(max_backups: usize) -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let codec = Arc::new(ItemCodec::new(storage, "app."));
        let state = Arc::new(RwLock::new(AppState::default()));
        let scheduler = Arc::new(ManualScheduler::new());

        let rotator = BackupRotator::new(
            Arc::clone(&codec),
            Arc::clone(&state),
            scheduler.clone(),
            Duration::from_millis(200),
            max_backups,
        );

        Harness {
            scheduler,
            state,
            codec,
            rotator,
        }
    }

    #[test]
    fn test_burst_coalesces_to_one_snapshot() {
        let h = harness(10);
        h.state.write().items.push(item("one"));

        h.rotator.schedule();
        h.rotator.schedule();
        h.rotator.schedule();
        assert!(h.rotator.is_pending());
        assert_eq!(h.scheduler.arm_count(), 3);

        assert!(h.scheduler.fire());
        assert!(!h.rotator.is_pending());

        let backups = h.codec.load_backups();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].items.len(), 1);
    }

    #[test]
    fn test_rotation_caps_retained_snapshots() {
        let h = harness(10);

        for round in 0..12 {
            h.state.write().items.push(item(&format!("item {}", round)));
            h.rotator.schedule();
            h.scheduler.fire();
        }

        let backups = h.codec.load_backups();
        assert_eq!(backups.len(), 10);

        // Newest first: the head snapshot saw all 12 items, the tail saw 3.
        assert_eq!(backups[0].items.len(), 12);
        assert_eq!(backups[9].items.len(), 3);
    }

    #[test]
    fn test_periodic_bypasses_debounce() {
        let h = harness(10);
        h.rotator.start_periodic(Duration::from_secs(3600));

        h.rotator.schedule();
        assert!(h.rotator.is_pending());

        assert_eq!(h.scheduler.fire_repeating(), 1);

        // Periodic snapshot landed while the debounce is still armed.
        assert_eq!(h.codec.load_backups().len(), 1);
        assert!(h.rotator.is_pending());
    }

    #[test]
    fn test_flush_runs_pending_and_disarms() {
        let h = harness(10);
        h.state.write().items.push(item("one"));

        h.rotator.schedule();
        h.rotator.flush();

        assert_eq!(h.codec.load_backups().len(), 1);
        // The armed task was cancelled along with the pending flag.
        assert!(!h.scheduler.fire());
    }

    #[test]
    fn test_flush_without_pending_is_noop() {
        let h = harness(10);
        h.rotator.flush();
        assert!(h.codec.load_backups().is_empty());
    }

    struct FailingStorage;

    impl StorageAdapter for FailingStorage {
        fn read(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn write(&self, _key: &str, _value: &str) -> Result<()> {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "quota exceeded",
            )))
        }
    }

    #[test]
    fn test_backup_failure_is_swallowed() {
        let codec = Arc::new(ItemCodec::new(Arc::new(FailingStorage), "app."));
        let state = Arc::new(RwLock::new(AppState::default()));
        let scheduler = Arc::new(ManualScheduler::new());

        let rotator = BackupRotator::new(
            Arc::clone(&codec),
            state,
            scheduler.clone(),
            Duration::from_millis(200),
            10,
        );

        rotator.schedule();
        assert!(scheduler.fire());
        assert!(codec.load_backups().is_empty());
    }
}
