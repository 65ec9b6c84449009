use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheState, TreeCache};
use crate::config::Config;
use crate::error::Result;
use crate::normalize::normalize_address;
use crate::source::{CsvSource, SnapshotSource};
use crate::store::{CacheStore, FileStore};

/// Answer to a proof lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimProof {
    pub root: String,
    pub proof: Vec<String>,
    pub value: String,
    pub exists: bool,
}

/// Summary of the tree currently served
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeInfo {
    pub root: String,
    pub timestamp: i64,
    pub leaves: usize,
    pub rejected: usize,
    pub state: CacheState,
}

/// Read path used by the claim API and the verifier tooling.
///
/// Holds the cache it reads from; clone it freely, clones share the cache.
pub struct ProofLookup<S, St> {
    cache: Arc<TreeCache<S, St>>,
}

impl<S, St> Clone for ProofLookup<S, St> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl ProofLookup<CsvSource, FileStore> {
    /// Service reading the configured snapshot file and persisting next to
    /// the configured cache path
    pub fn from_config(config: &Config) -> Self {
        let cache = TreeCache::new(
            CsvSource::from_config(&config.snapshot),
            FileStore::new(&config.cache_path),
            config.cache_options(),
        );
        Self::new(Arc::new(cache))
    }
}

impl<S, St> ProofLookup<S, St>
where
    S: SnapshotSource,
    St: CacheStore,
{
    pub fn new(cache: Arc<TreeCache<S, St>>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<TreeCache<S, St>> {
        &self.cache
    }

    /// Returns root, proof and value for `address`.
    ///
    /// An address that is not in the snapshot is a normal answer: `exists`
    /// is false, the proof empty and the value `"0"`, with the current root.
    pub fn lookup(&self, address: &str) -> Result<ClaimProof> {
        let entry = self.cache.get()?;

        let leaf = normalize_address(address).and_then(|address| entry.find(&address));
        let Some(leaf) = leaf else {
            return Ok(ClaimProof {
                root: entry.root.clone(),
                proof: Vec::new(),
                value: "0".to_string(),
                exists: false,
            });
        };

        Ok(ClaimProof {
            root: entry.root.clone(),
            proof: entry.proofs.get(&leaf.address).cloned().unwrap_or_default(),
            value: leaf.value.clone(),
            exists: true,
        })
    }

    /// Root and counts of the tree being served, building it if needed.
    pub fn info(&self) -> Result<TreeInfo> {
        let entry = self.cache.get()?;
        Ok(TreeInfo {
            root: entry.root.clone(),
            timestamp: entry.timestamp,
            leaves: entry.leaves.len(),
            rejected: entry.rejected,
            state: self.cache.state(),
        })
    }
}
