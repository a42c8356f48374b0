use crate::ports::snapshot_store::{Result, Snapshot, SnapshotStore as SnapshotStoreTrait};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory implementation of SnapshotStore
///
/// Keeps the last saved snapshot as serialized JSON so that tests exercise
/// the same encoding as the file store. Saves can be made to fail on demand.
#[derive(Default)]
pub struct SnapshotStore {
    saved: Mutex<Option<String>>,
    fail_saves: AtomicBool,
    save_count: AtomicUsize,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already persisted snapshot
    pub fn with_snapshot(snapshot: &Snapshot) -> Result<Self> {
        let store = Self::new();
        *store.lock() = Some(serde_json::to_string_pretty(snapshot)?);
        Ok(store)
    }

    /// Make every following save fail (or succeed again)
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    /// Raw JSON of the last successful save
    pub fn saved_json(&self) -> Option<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SnapshotStoreTrait for SnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>> {
        match self.lock().as_deref() {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err("snapshot store unavailable".into());
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        *self.lock() = Some(json);
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let store = SnapshotStore::new();
        assert!(store.load().unwrap().is_none());

        store.save(&Snapshot::empty()).unwrap();

        assert_eq!(store.load().unwrap(), Some(Snapshot::empty()));
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn test_failed_save_keeps_previous_snapshot() {
        let store = SnapshotStore::new();
        store.save(&Snapshot::empty()).unwrap();
        let before = store.saved_json();

        store.set_fail_saves(true);
        let mut changed = Snapshot::empty();
        changed.version = 99;

        assert!(store.save(&changed).is_err());
        assert_eq!(store.saved_json(), before);
        assert_eq!(store.save_count(), 1);
    }
}
