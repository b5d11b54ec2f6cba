//! Key-value store abstraction and the two bundled backends.
//!
//! The engine only ever sees [`KeyValueStore`]: an opaque string-keyed
//! document store with get/set/delete/prefix-query. The store offers
//! per-key atomicity and nothing more; there are no cross-key
//! transactions, so every cascade in the engine is written to be
//! safely re-runnable.

use fs2::FileExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::StoreError;

/// Opaque string-keyed document store.
pub trait KeyValueStore: Send + Sync {
    /// Fetches the document at `key`, `None` when absent.
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Writes the whole document at `key`, overwriting any prior value.
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Removes the document at `key`; absent keys are a no-op.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Returns every `(key, document)` pair whose key starts with
    /// `prefix`, in key order. Always runs to completion.
    fn query_by_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError>;
}

/// In-memory store used by tests and embedders.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let documents = self.documents.lock().expect("store mutex poisoned");
        Ok(documents.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().expect("store mutex poisoned");
        documents.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().expect("store mutex poisoned");
        documents.remove(key);
        Ok(())
    }

    fn query_by_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let documents = self.documents.lock().expect("store mutex poisoned");
        Ok(documents
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// File-backed store: one JSON document map on disk, guarded by an
/// advisory lock file for rudimentary multi-process support.
pub struct FileStore {
    file_path: PathBuf,
    lock_file_path: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        let lock_file_path = file_path.with_extension("json.lock");
        Self {
            file_path,
            lock_file_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Acquire an exclusive lock for writing. The returned handle must
    /// be held for the duration of the operation.
    fn acquire_write_lock(&self) -> Result<File, StoreError> {
        if let Some(parent) = self.lock_file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.lock_file_path)?;

        let start = std::time::Instant::now();
        let timeout = Duration::from_secs(5);

        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => return Ok(lock_file),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > timeout {
                        return Err(StoreError::Backend(format!(
                            "timeout waiting for lock on {:?}",
                            self.file_path
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => return Err(StoreError::Io(e)),
            }
        }
    }

    fn load_map(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        if !self.file_path.exists() {
            return Ok(BTreeMap::new());
        }
        let file = File::open(&self.file_path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    fn save_map(&self, documents: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut lock_file = self.acquire_write_lock()?;
        let _ = writeln!(
            lock_file,
            "Locked by PID {} at {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );

        let json = serde_json::to_string_pretty(documents)?;
        fs::write(&self.file_path, json)?;

        // Lock is released when lock_file is dropped.
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.load_map()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut documents = self.load_map()?;
        documents.insert(key.to_string(), value);
        self.save_map(&documents)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut documents = self.load_map()?;
        if documents.remove(key).is_some() {
            self.save_map(&documents)?;
        }
        Ok(())
    }

    fn query_by_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        Ok(self
            .load_map()?
            .into_iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.set("catalog-1", json!({"title": "Perf"})).unwrap();

        let value = store.get("catalog-1").unwrap().unwrap();
        assert_eq!(value["title"], "Perf");

        store.delete("catalog-1").unwrap();
        assert!(store.get("catalog-1").unwrap().is_none());
    }

    #[test]
    fn test_memory_store_prefix_query() {
        let store = MemoryStore::new();
        store.set("catalog-1", json!(1)).unwrap();
        store.set("catalog-2", json!(2)).unwrap();
        store.set("issue-ABC-1", json!([])).unwrap();

        let catalogs = store.query_by_prefix("catalog-").unwrap();
        assert_eq!(catalogs.len(), 2);
        assert_eq!(catalogs[0].0, "catalog-1");

        let issues = store.query_by_prefix("issue-").unwrap();
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::new(&path);
        store.set("catalog-9", json!({"title": "Backup"})).unwrap();
        drop(store);

        let reopened = FileStore::new(&path);
        let value = reopened.get("catalog-9").unwrap().unwrap();
        assert_eq!(value["title"], "Backup");
    }

    #[test]
    fn test_file_store_delete_absent_key_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("store.json"));
        store.delete("catalog-missing").unwrap();
        assert!(store.get("catalog-missing").unwrap().is_none());
    }
}
