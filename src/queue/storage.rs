//! Trait abstraction for durable key-value storage to enable testing

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Read-modify-write callback passed to [`KeyValueStore::update_item`]
pub type ItemUpdate<'a> = dyn FnMut(Option<String>) -> io::Result<Option<String>> + 'a;

/// `localStorage`-style persistence surviving process restarts
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key was never written
    fn get_item(&self, key: &str) -> io::Result<Option<String>>;

    /// Durably replace a value
    fn set_item(&self, key: &str, value: &str) -> io::Result<()>;

    /// Read-modify-write `key` while holding it exclusively
    ///
    /// `update` receives the current value and returns the replacement, or
    /// `None` to leave the value untouched. No other writer, in this process
    /// or another, can change the value between the read and the write.
    fn update_item<'u>(
        &self,
        key: &str,
        update: &mut ItemUpdate<'u>,
    ) -> io::Result<()>;
}

/// One file per key under a data directory.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a crash mid-write leaves the previous value intact.
/// [`KeyValueStore::update_item`] holds an advisory lock on a sibling
/// `{key}.lock` file, so separate processes sharing the directory take turns.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the file backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn lock_path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", key))
    }
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path_for(key);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        debug!("Persisted {} bytes to {}", value.len(), target.display());
        Ok(())
    }

    fn update_item<'u>(
        &self,
        key: &str,
        update: &mut ItemUpdate<'u>,
    ) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path_for(key))?;
        let mut lock = fd_lock::RwLock::new(lock_file);
        let _held = lock.write()?;

        if let Some(value) = update(self.get_item(key)?)? {
            self.set_item(key, &value)?;
        }
        Ok(())
    }
}

/// Volatile store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> io::Result<Option<String>> {
        let items = self
            .items
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory store poisoned"))?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> io::Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory store poisoned"))?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn update_item<'u>(
        &self,
        key: &str,
        update: &mut ItemUpdate<'u>,
    ) -> io::Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory store poisoned"))?;
        if let Some(value) = update(items.get(key).cloned())? {
            items.insert(key.to_string(), value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(store.get_item("queue").unwrap(), None);
    }

    #[test]
    fn test_file_store_round_trip_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));
        store.set_item("queue", "[1]").unwrap();
        store.set_item("queue", "[1,2]").unwrap();
        assert_eq!(store.get_item("queue").unwrap().as_deref(), Some("[1,2]"));
        assert!(store.path_for("queue").exists());
    }

    #[test]
    fn test_file_store_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        FileStore::new(dir.path()).set_item("k", "v").unwrap();
        let reopened = FileStore::new(dir.path());
        assert_eq!(reopened.get_item("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_file_store_update_sees_other_instance_writes() {
        let dir = tempfile::tempdir().unwrap();
        let first = FileStore::new(dir.path());
        let second = FileStore::new(dir.path());
        first.set_item("k", "a").unwrap();

        second
            .update_item("k", &mut |current| Ok(current.map(|v| format!("{}b", v))))
            .unwrap();
        first
            .update_item("k", &mut |current| Ok(current.map(|v| format!("{}c", v))))
            .unwrap();
        assert_eq!(first.get_item("k").unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_update_returning_none_leaves_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.update_item("k", &mut |_| Ok(None)).unwrap();
        assert_eq!(store.get_item("k").unwrap(), None);

        let memory = MemoryStore::new();
        memory.set_item("k", "v").unwrap();
        memory.update_item("k", &mut |_| Ok(None)).unwrap();
        assert_eq!(memory.get_item("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_failed_update_keeps_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.set_item("k", "v").unwrap();
        let result = store.update_item("k", &mut |_| {
            Err(io::Error::new(io::ErrorKind::InvalidData, "bad"))
        });
        assert!(result.is_err());
        assert_eq!(store.get_item("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get_item("k").unwrap(), None);
        store.set_item("k", "v").unwrap();
        assert_eq!(store.get_item("k").unwrap().as_deref(), Some("v"));
    }
}
