//! Durable storage for the built tree.
//!
//! The cache only needs two capabilities from storage, reading the last entry
//! and replacing it, so tests can run against [`MemoryStore`] while the binary
//! persists to a JSON file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::CacheEntry;
use crate::common::write_file_atomic;
use crate::error::{Error, Result};

/// Storage backend for [`CacheEntry`] values
pub trait CacheStore: Send + Sync {
    /// Reads the stored entry.
    ///
    /// # Returns
    /// `Ok(Some(entry))` if present, `Ok(None)` if nothing was stored yet, or
    /// `CacheReadCorrupt` when the stored bytes cannot be parsed
    fn read(&self) -> Result<Option<CacheEntry>>;

    /// Replaces the stored entry
    fn write(&self, entry: &CacheEntry) -> Result<()>;
}

impl<T: CacheStore + ?Sized> CacheStore for Arc<T> {
    fn read(&self) -> Result<Option<CacheEntry>> {
        (**self).read()
    }

    fn write(&self, entry: &CacheEntry) -> Result<()> {
        (**self).write(entry)
    }
}

/// Pretty-printed JSON file, replaced atomically on every write
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl CacheStore for FileStore {
    fn read(&self) -> Result<Option<CacheEntry>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::CacheReadCorrupt(format!(
                    "failed to read {:?}: {}",
                    self.path, e
                )))
            }
        };

        let entry = serde_json::from_str::<CacheEntry>(&content).map_err(|e| {
            Error::CacheReadCorrupt(format!("failed to parse {:?}: {}", self.path, e))
        })?;
        debug!("Loaded Merkle tree cache from {:?}", self.path);
        Ok(Some(entry))
    }

    fn write(&self, entry: &CacheEntry) -> Result<()> {
        let json = serde_json::to_string_pretty(entry)?;
        write_file_atomic(&self.path, &json)?;
        debug!("Saved Merkle tree cache to {:?}", self.path);
        Ok(())
    }
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entry: Mutex<Option<CacheEntry>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts out holding `entry`, as if a previous process had written it
    pub fn with_entry(entry: CacheEntry) -> Self {
        Self {
            entry: Mutex::new(Some(entry)),
            writes: Mutex::new(0),
        }
    }

    /// Number of successful writes
    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

impl CacheStore for MemoryStore {
    fn read(&self) -> Result<Option<CacheEntry>> {
        Ok(self.entry.lock().clone())
    }

    fn write(&self, entry: &CacheEntry) -> Result<()> {
        *self.entry.lock() = Some(entry.clone());
        *self.writes.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::Leaf;
    use crate::tree::MerkleTree;

    fn sample_entry() -> CacheEntry {
        let tree = MerkleTree::build(vec![Leaf::new("addr1", "100"), Leaf::new("addr2", "250")])
            .unwrap();
        CacheEntry::from_tree(&tree, 1, 1_700_000_000_000)
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("merkle-cache.json"));
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("merkle-cache.json"));
        let entry = sample_entry();

        store.write(&entry).unwrap();

        assert_eq!(store.read().unwrap(), Some(entry));
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merkle-cache.json");
        fs::write(&path, "{ not json").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.read(), Err(Error::CacheReadCorrupt(_))));
    }

    #[test]
    fn test_file_store_reads_original_layout() {
        // Entries written before `rejected` existed still load
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merkle-cache.json");
        let entry = sample_entry();
        let legacy = serde_json::json!({
            "root": &entry.root,
            "proofs": &entry.proofs,
            "leaves": &entry.leaves,
            "timestamp": entry.timestamp,
        });
        fs::write(&path, legacy.to_string()).unwrap();

        let loaded = FileStore::new(&path).read().unwrap().unwrap();
        assert_eq!(loaded.root, entry.root);
        assert_eq!(loaded.rejected, 0);
    }

    #[test]
    fn test_memory_store_counts_writes() {
        let store = MemoryStore::new();
        assert!(store.read().unwrap().is_none());
        store.write(&sample_entry()).unwrap();
        store.write(&sample_entry()).unwrap();
        assert_eq!(store.writes(), 2);
        assert!(store.read().unwrap().is_some());
    }
}
