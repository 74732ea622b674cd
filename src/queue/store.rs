//! # Offline Queue Store
//!
//! The single owner of the persisted queue of captures awaiting remote
//! persistence. All reads and writes go through [`OfflineQueue`]; shared
//! access across the submission and replay paths goes through
//! [`SharedQueue`], which serialises every operation behind one async mutex.
//!
//! Several processes may hold an [`OfflineQueue`] on the same store (a
//! long-running `watch` next to one-shot `record` calls). The stored value is
//! the source of truth: every mutation reloads it under the store's exclusive
//! update, applies the change and writes it back before returning.
//!
//! ## Invariants
//!
//! - Entries are kept in insertion order and never reordered or deduplicated
//! - Entries are removed one at a time from the front only
//! - Every mutation is written to storage before it returns; a failed write
//!   leaves both the stored and the in-memory list unchanged

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::record::StoredSubmission;
use super::storage::KeyValueStore;
use crate::capture::{LocationCapture, QueuedSubmission};
use crate::error::{LocatorError, Result};

/// Queue handle shared by the submission pipeline and the replayer
pub type SharedQueue = Arc<Mutex<OfflineQueue>>;

pub struct OfflineQueue {
    store: Arc<dyn KeyValueStore>,
    key: String,
    /// Stored entries as of the last load or mutation
    entries: VecDeque<QueuedSubmission>,
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineQueue")
            .field("key", &self.key)
            .field("count", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl OfflineQueue {
    /// Load the queue persisted under `key`
    ///
    /// A missing or empty value is an empty queue.
    ///
    /// # Errors
    ///
    /// Returns [`LocatorError::Storage`] if the store cannot be read or the
    /// persisted value does not parse. A corrupt queue is never discarded
    /// silently.
    pub fn open(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let entries = load(store.as_ref(), &key)?;

        if !entries.is_empty() {
            info!("Restored {} queued location submissions", entries.len());
        }

        Ok(Self {
            store,
            key,
            entries,
        })
    }

    /// Wrap the queue for shared access
    pub fn into_shared(self) -> SharedQueue {
        Arc::new(Mutex::new(self))
    }

    /// Pick up changes written by other holders of the same store
    pub fn refresh(&mut self) -> Result<()> {
        self.entries = load(self.store.as_ref(), &self.key)?;
        Ok(())
    }

    /// Append a capture stamped with the current time. Returns the new count.
    pub fn enqueue(&mut self, capture: LocationCapture) -> Result<usize> {
        self.enqueue_at(capture, Utc::now())
    }

    pub fn enqueue_at(&mut self, capture: LocationCapture, enqueued_at: DateTime<Utc>) -> Result<usize> {
        let unit = capture.unit_id().clone();
        let mut pending = Some(QueuedSubmission::new(capture, enqueued_at));
        let count = self
            .update(|entries| {
                pending.take().map(|entry| {
                    entries.push_back(entry);
                    entries.len()
                })
            })?
            .ok_or_else(|| {
                LocatorError::Storage(format!("offline queue '{}' was not updated", self.key))
            })?;
        debug!("Queued location for unit {} ({} pending)", unit, count);
        Ok(count)
    }

    pub fn peek_oldest(&self) -> Option<&QueuedSubmission> {
        self.entries.front()
    }

    /// Remove and return the stored oldest entry
    pub fn remove_oldest(&mut self) -> Result<Option<QueuedSubmission>> {
        self.update(|entries| entries.pop_front())
    }

    /// Remove `expected` if it is still the stored oldest entry
    ///
    /// Returns `None`, leaving storage untouched, when another holder already
    /// removed it or the queue is empty.
    pub fn remove_if_oldest(&mut self, expected: &QueuedSubmission) -> Result<Option<QueuedSubmission>> {
        let removed = self.update(|entries| {
            if entries.front() == Some(expected) {
                entries.pop_front()
            } else {
                None
            }
        })?;
        if removed.is_none() {
            warn!(
                "Queued location for unit {} was no longer at the head of '{}'",
                expected.capture.unit_id(),
                self.key
            );
        }
        Ok(removed)
    }

    /// Snapshot of the queue, oldest first
    pub fn list(&self) -> Vec<QueuedSubmission> {
        self.entries.iter().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply `change` to the freshly loaded stored list and write the result
    ///
    /// A `None` from `change` skips the write. The in-memory list only moves
    /// to the new state once the store accepted it.
    fn update<T>(
        &mut self,
        mut change: impl FnMut(&mut VecDeque<QueuedSubmission>) -> Option<T>,
    ) -> Result<Option<T>> {
        let key = self.key.clone();
        let mut outcome = None;
        let mut latest = None;

        self.store
            .update_item(&self.key, &mut |raw: Option<String>| {
                let mut entries = decode(&key, raw.as_deref())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
                let result = change(&mut entries);
                let replacement = match result {
                    Some(_) => Some(encode(&entries)?),
                    None => None,
                };
                outcome = result;
                latest = Some(entries);
                Ok(replacement)
            })
            .map_err(|e| {
                error!("Failed to update offline queue '{}': {}", self.key, e);
                LocatorError::Storage(format!("failed to write offline queue '{}': {}", self.key, e))
            })?;

        if let Some(entries) = latest {
            self.entries = entries;
        }
        Ok(outcome)
    }
}

fn load(store: &dyn KeyValueStore, key: &str) -> Result<VecDeque<QueuedSubmission>> {
    let raw = store
        .get_item(key)
        .map_err(|e| LocatorError::Storage(format!("failed to read offline queue '{}': {}", key, e)))?;
    decode(key, raw.as_deref())
}

fn decode(key: &str, raw: Option<&str>) -> Result<VecDeque<QueuedSubmission>> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => {
            let stored: Vec<StoredSubmission> = serde_json::from_str(raw).map_err(|e| {
                error!("Offline queue '{}' is corrupt: {}", key, e);
                LocatorError::Storage(format!("corrupt offline queue '{}': {}", key, e))
            })?;
            Ok(stored.into_iter().map(QueuedSubmission::from).collect())
        }
        _ => Ok(VecDeque::new()),
    }
}

fn encode(entries: &VecDeque<QueuedSubmission>) -> io::Result<String> {
    let stored: Vec<StoredSubmission> = entries.iter().map(StoredSubmission::from).collect();
    serde_json::to_string(&stored).map_err(io::Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureSource, Coordinate, UnitId};
    use crate::queue::storage::{FileStore, MemoryStore, MockKeyValueStore};
    use std::io;

    fn capture(unit: &str) -> LocationCapture {
        LocationCapture::new(
            UnitId::new(unit),
            Coordinate::new(51.5, -0.12),
            Some(12.0),
            CaptureSource::Gps,
            None,
        )
    }

    fn units(queue: &OfflineQueue) -> Vec<String> {
        queue
            .list()
            .iter()
            .map(|e| e.capture.unit_id().to_string())
            .collect()
    }

    #[test]
    fn test_fifo_order_and_duplicates_kept() {
        let mut queue = OfflineQueue::open(Arc::new(MemoryStore::new()), "q").unwrap();
        assert_eq!(queue.enqueue(capture("A")).unwrap(), 1);
        assert_eq!(queue.enqueue(capture("B")).unwrap(), 2);
        assert_eq!(queue.enqueue(capture("A")).unwrap(), 3);
        assert_eq!(units(&queue), vec!["A", "B", "A"]);

        assert_eq!(queue.peek_oldest().unwrap().capture.unit_id().as_str(), "A");
        let removed = queue.remove_oldest().unwrap().unwrap();
        assert_eq!(removed.capture.unit_id().as_str(), "A");
        assert_eq!(units(&queue), vec!["B", "A"]);
    }

    #[test]
    fn test_remove_from_empty_queue() {
        let mut queue = OfflineQueue::open(Arc::new(MemoryStore::new()), "q").unwrap();
        assert!(queue.remove_oldest().unwrap().is_none());
        assert!(queue.peek_oldest().is_none());
    }

    #[test]
    fn test_restart_reloads_entries_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Arc::new(FileStore::new(dir.path()));
            let mut queue = OfflineQueue::open(store, "offline").unwrap();
            queue.enqueue(capture("first")).unwrap();
            queue.enqueue(capture("second")).unwrap();
        }

        let store = Arc::new(FileStore::new(dir.path()));
        let queue = OfflineQueue::open(store, "offline").unwrap();
        assert_eq!(queue.count(), 2);
        assert_eq!(units(&queue), vec!["first", "second"]);
    }

    #[test]
    fn test_restart_preserves_capture_fields() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let original = LocationCapture::new(
            UnitId::new("U7"),
            Coordinate::new(-33.86, 151.2),
            Some(10.0),
            CaptureSource::Manual,
            Some("dock 4".to_string()),
        );
        let mut queue = OfflineQueue::open(store.clone(), "q").unwrap();
        queue.enqueue(original.clone()).unwrap();

        let reopened = OfflineQueue::open(store, "q").unwrap();
        assert_eq!(reopened.peek_oldest().unwrap().capture, original);
    }

    #[test]
    fn test_corrupt_queue_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        store.set_item("q", "{not json").unwrap();
        let result = OfflineQueue::open(store, "q");
        assert!(matches!(result, Err(LocatorError::Storage(_))));
    }

    #[test]
    fn test_empty_value_is_empty_queue() {
        let store = Arc::new(MemoryStore::new());
        store.set_item("q", "  ").unwrap();
        assert_eq!(OfflineQueue::open(store, "q").unwrap().count(), 0);
    }

    #[test]
    fn test_failed_write_rolls_back_enqueue() {
        let mut store = MockKeyValueStore::new();
        store.expect_get_item().returning(|_| Ok(None));
        store.expect_update_item().returning(|_, update| {
            update(None)?;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        });

        let mut queue = OfflineQueue::open(Arc::new(store), "q").unwrap();
        assert!(matches!(
            queue.enqueue(capture("A")),
            Err(LocatorError::Storage(_))
        ));
        assert_eq!(queue.count(), 0);
    }

    #[test]
    fn test_failed_write_rolls_back_remove() {
        const STORED: &str = r#"[{"unitId":"A","latitude":1.0,"longitude":2.0,"notes":null,"enqueuedAt":"2024-01-01T00:00:00Z"}]"#;
        let mut store = MockKeyValueStore::new();
        store
            .expect_get_item()
            .returning(|_| Ok(Some(STORED.to_string())));
        store.expect_update_item().returning(|_, update| {
            update(Some(STORED.to_string()))?;
            Err(io::Error::new(io::ErrorKind::Other, "read-only"))
        });

        let mut queue = OfflineQueue::open(Arc::new(store), "q").unwrap();
        assert!(queue.remove_oldest().is_err());
        assert_eq!(queue.count(), 1);
        assert_eq!(queue.peek_oldest().unwrap().capture.unit_id().as_str(), "A");
    }

    #[test]
    fn test_queues_sharing_a_file_store_keep_each_others_entries() {
        let dir = tempfile::tempdir().unwrap();
        let open = || OfflineQueue::open(Arc::new(FileStore::new(dir.path())), "offline").unwrap();

        open().enqueue(capture("A")).unwrap();
        let mut watcher = open();
        let mut recorder = open();

        recorder.enqueue(capture("B")).unwrap();
        let removed = watcher.remove_oldest().unwrap().unwrap();
        assert_eq!(removed.capture.unit_id().as_str(), "A");
        assert_eq!(units(&watcher), vec!["B"]);

        assert_eq!(units(&open()), vec!["B"]);
    }

    #[test]
    fn test_refresh_sees_entries_from_another_holder() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut watcher = OfflineQueue::open(store.clone(), "q").unwrap();
        let mut recorder = OfflineQueue::open(store, "q").unwrap();

        recorder.enqueue(capture("late")).unwrap();
        assert!(watcher.is_empty());
        watcher.refresh().unwrap();
        assert_eq!(units(&watcher), vec!["late"]);
    }

    #[test]
    fn test_remove_if_oldest_leaves_a_changed_head() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut first = OfflineQueue::open(store.clone(), "q").unwrap();
        first.enqueue(capture("A")).unwrap();
        first.enqueue(capture("B")).unwrap();
        let head = first.peek_oldest().cloned().unwrap();

        let mut second = OfflineQueue::open(store.clone(), "q").unwrap();
        second.remove_oldest().unwrap();

        assert!(first.remove_if_oldest(&head).unwrap().is_none());
        assert_eq!(units(&first), vec!["B"]);
        assert_eq!(units(&OfflineQueue::open(store, "q").unwrap()), vec!["B"]);
    }

    #[test]
    fn test_remove_if_oldest_removes_matching_head() {
        let mut queue = OfflineQueue::open(Arc::new(MemoryStore::new()), "q").unwrap();
        queue.enqueue(capture("A")).unwrap();
        queue.enqueue(capture("B")).unwrap();
        let head = queue.peek_oldest().cloned().unwrap();

        let removed = queue.remove_if_oldest(&head).unwrap().unwrap();
        assert_eq!(removed, head);
        assert_eq!(units(&queue), vec!["B"]);
    }

    #[test]
    fn test_unreadable_store_is_an_error() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_get_item()
            .returning(|_| Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")));
        assert!(OfflineQueue::open(Arc::new(store), "q").is_err());
    }
}
