//! Endpoint record storage.
//!
//! The [`SchemaStore`] trait is the persistence contract for the recorder.
//! Stores hold plain data; all merge logic lives in [`crate::Recorder`].
//!
//! | Type | When to use |
//! |------|-------------|
//! | [`MemoryStore`] | Tests, one-shot CLI runs |
//! | [`FileStore`] | Accumulating a log across runs in a JSON file |
//!
//! Records keep first-seen order, like the capture log they mirror. The
//! record cap is applied by the recorder through [`SchemaStore::remove`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::types::SchemaNode;

/// Accumulated schema for one canonical endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRecord {
    pub canonical_key: String,
    /// Absolute URL of the first capture for this key.
    pub url: String,
    pub method: String,
    pub schema: SchemaNode,
    /// Time of the most recent capture folded into `schema`.
    pub timestamp: DateTime<Utc>,
}

/// Persistence contract for endpoint records.
///
/// Implementations must be `Send + Sync` so one store can back a recorder
/// shared across threads. Callers serialize read-merge-write per key.
pub trait SchemaStore: Send + Sync {
    /// Fetch the record for a canonical key.
    fn get(&self, key: &str) -> Result<Option<EndpointRecord>, StoreError>;

    /// Insert or replace the record with the same canonical key.
    fn put(&self, record: EndpointRecord) -> Result<(), StoreError>;

    /// Remove a record, returning it if it existed.
    fn remove(&self, key: &str) -> Result<Option<EndpointRecord>, StoreError>;

    /// All records in first-seen order.
    fn records(&self) -> Result<Vec<EndpointRecord>, StoreError>;
}

impl<S: SchemaStore + ?Sized> SchemaStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<EndpointRecord>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, record: EndpointRecord) -> Result<(), StoreError> {
        (**self).put(record)
    }

    fn remove(&self, key: &str) -> Result<Option<EndpointRecord>, StoreError> {
        (**self).remove(key)
    }

    fn records(&self) -> Result<Vec<EndpointRecord>, StoreError> {
        (**self).records()
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Slot {
    seq: u64,
    record: EndpointRecord,
}

#[derive(Debug, Default)]
struct Records {
    next_seq: u64,
    by_key: BTreeMap<String, Slot>,
}

impl Records {
    /// A replaced key keeps its original position.
    fn insert(&mut self, record: EndpointRecord) -> Option<Slot> {
        let seq = match self.by_key.get(&record.canonical_key) {
            Some(existing) => existing.seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.by_key
            .insert(record.canonical_key.clone(), Slot { seq, record })
    }
}

/// Thread-safe in-memory store.
///
/// Records are keyed by canonical key; each carries an insertion sequence
/// so [`SchemaStore::records`] can return them in first-seen order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_records(records: Vec<EndpointRecord>) -> Self {
        let mut inner = Records::default();
        for record in records {
            inner.insert(record);
        }
        Self {
            records: RwLock::new(inner),
        }
    }

    /// Insert or replace. Returns the slot that was replaced.
    fn replace(&self, record: EndpointRecord) -> Result<Option<Slot>, StoreError> {
        let mut inner = self.records.write().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.insert(record))
    }

    fn take(&self, key: &str) -> Result<Option<Slot>, StoreError> {
        let mut inner = self.records.write().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.by_key.remove(key))
    }

    /// Put back what `replace` or `take` displaced for `key`.
    fn restore(&self, key: &str, previous: Option<Slot>) -> Result<(), StoreError> {
        let mut inner = self.records.write().map_err(|_| StoreError::Poisoned)?;
        match previous {
            Some(slot) => {
                inner.by_key.insert(key.to_string(), slot);
            }
            None => {
                inner.by_key.remove(key);
            }
        }
        Ok(())
    }
}

impl SchemaStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<EndpointRecord>, StoreError> {
        let inner = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.by_key.get(key).map(|slot| slot.record.clone()))
    }

    fn put(&self, record: EndpointRecord) -> Result<(), StoreError> {
        self.replace(record).map(|_| ())
    }

    fn remove(&self, key: &str) -> Result<Option<EndpointRecord>, StoreError> {
        Ok(self.take(key)?.map(|slot| slot.record))
    }

    fn records(&self) -> Result<Vec<EndpointRecord>, StoreError> {
        let inner = self.records.read().map_err(|_| StoreError::Poisoned)?;
        let mut slots: Vec<&Slot> = inner.by_key.values().collect();
        slots.sort_by_key(|slot| slot.seq);
        Ok(slots.into_iter().map(|slot| slot.record.clone()).collect())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// Store backed by a JSON array of records on disk.
///
/// The file is read once on open and rewritten after every change
/// (temp file, then rename). A change whose write fails is rolled back in
/// memory, so reads never return unsaved records.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    memory: MemoryStore,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open a store, loading existing records if the file exists.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Read` if the file can't be read, or
    /// `StoreError::Corrupt` if it isn't a JSON array of records.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let records: Vec<EndpointRecord> = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| StoreError::Read {
                path: path.clone(),
                source,
            })?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                    path: path.clone(),
                    source,
                })?
            }
        } else {
            Vec::new()
        };

        debug!(path = %path.display(), records = records.len(), "opened file store");

        Ok(Self {
            path,
            memory: MemoryStore::from_records(records),
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let records = self.memory.records()?;
        let contents = serde_json::to_string_pretty(&records)
            .map_err(|source| StoreError::Serialize { source })?;

        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, contents).map_err(|source| StoreError::Write {
            path: temp_path.clone(),
            source,
        })?;
        std::fs::rename(&temp_path, &self.path).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn flush_or_restore(&self, key: &str, previous: Option<Slot>) -> Result<(), StoreError> {
        match self.flush() {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(%key, error = %e, "store write failed, rolling back");
                self.memory.restore(key, previous)?;
                Err(e)
            }
        }
    }
}

impl SchemaStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<EndpointRecord>, StoreError> {
        self.memory.get(key)
    }

    fn put(&self, record: EndpointRecord) -> Result<(), StoreError> {
        let key = record.canonical_key.clone();
        let previous = self.memory.replace(record)?;
        self.flush_or_restore(&key, previous)
    }

    fn remove(&self, key: &str) -> Result<Option<EndpointRecord>, StoreError> {
        let Some(taken) = self.memory.take(key)? else {
            return Ok(None);
        };
        let removed = taken.record.clone();
        self.flush_or_restore(key, Some(taken))?;
        Ok(Some(removed))
    }

    fn records(&self) -> Result<Vec<EndpointRecord>, StoreError> {
        self.memory.records()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SchemaType;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record(key: &str, secs: i64) -> EndpointRecord {
        EndpointRecord {
            canonical_key: key.to_string(),
            url: format!("https://a.test/{key}"),
            method: "GET".to_string(),
            schema: SchemaNode::of(SchemaType::Number),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    // === MemoryStore ===

    #[test]
    fn memory_put_then_get() {
        let store = MemoryStore::new();
        store.put(record("a", 1)).unwrap();

        assert_eq!(store.get("a").unwrap().unwrap().timestamp.timestamp(), 1);
        assert!(store.get("b").unwrap().is_none());
    }

    #[test]
    fn memory_put_replaces_in_place() {
        let store = MemoryStore::new();
        store.put(record("a", 1)).unwrap();
        store.put(record("b", 2)).unwrap();
        store.put(record("a", 3)).unwrap();

        let records = store.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].canonical_key, "a");
        assert_eq!(records[0].timestamp.timestamp(), 3);
    }

    #[test]
    fn memory_remove_returns_record() {
        let store = MemoryStore::new();
        store.put(record("a", 1)).unwrap();

        assert_eq!(store.remove("a").unwrap(), Some(record("a", 1)));
        assert!(store.remove("a").unwrap().is_none());
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn memory_records_keep_first_seen_order() {
        let store = MemoryStore::new();
        for key in ["zeta", "alpha", "mid"] {
            store.put(record(key, 1)).unwrap();
        }
        store.put(record("alpha", 2)).unwrap();
        store.remove("zeta").unwrap();
        store.put(record("zeta", 3)).unwrap();

        let keys: Vec<String> = store
            .records()
            .unwrap()
            .into_iter()
            .map(|r| r.canonical_key)
            .collect();
        assert_eq!(keys, vec!["alpha", "mid", "zeta"]);
    }

    // === FileStore ===

    #[test]
    fn file_store_persists_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");

        let store = FileStore::open(&path).unwrap();
        store.put(record("a", 1)).unwrap();
        store.put(record("b", 2)).unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        let records = reopened.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], record("b", 2));
    }

    #[test]
    fn file_store_writes_camel_case_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");

        let store = FileStore::open(&path).unwrap();
        store.put(record("a", 0)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"canonicalKey\": \"a\""));
        assert!(content.contains("\"timestamp\": \"1970-01-01T00:00:00Z\""));
    }

    #[test]
    fn file_store_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, "{not json").unwrap();

        let result = FileStore::open(&path);
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn file_store_accepts_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, "").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn file_store_rolls_back_failed_put() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("log.json");

        let store = FileStore::open(&path).unwrap();
        let result = store.put(record("a", 1));

        assert!(matches!(result, Err(StoreError::Write { .. })));
        assert!(store.get("a").unwrap().is_none());
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn file_store_rolls_back_failed_update() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        let path = nested.join("log.json");

        let store = FileStore::open(&path).unwrap();
        store.put(record("a", 1)).unwrap();
        std::fs::remove_dir_all(&nested).unwrap();

        assert!(store.put(record("a", 2)).is_err());
        assert_eq!(store.get("a").unwrap().unwrap().timestamp.timestamp(), 1);
        assert!(store.remove("a").is_err());
        assert!(store.get("a").unwrap().is_some());
    }

    #[test]
    fn file_store_remove_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");

        let store = FileStore::open(&path).unwrap();
        store.put(record("a", 1)).unwrap();
        store.put(record("b", 2)).unwrap();
        store.remove("a").unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        let records = reopened.records().unwrap();
        assert_eq!(records, vec![record("b", 2)]);
    }
}
