//! Process-wide cache of the built claim tree.
//!
//! The entry moves through `EMPTY -> BUILDING -> FRESH -> STALE -> BUILDING`.
//! Reads check the in-memory slot, then durable storage, and only then build.
//! Entries are immutable and shared behind an [`Arc`]; a rebuild produces a
//! new entry and swaps the slot in one step, so a reader sees either the old
//! tree or the new one.
//!
//! At most one build runs at a time. While it runs, readers get the previous
//! entry when there is one and otherwise wait up to `build_wait` before
//! receiving [`Error::BuildInProgress`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::common::{hex_encode, parse_hash};
use crate::error::{Error, Result};
use crate::leaf::Leaf;
use crate::normalize::{normalize_records, NormalizeOptions};
use crate::source::SnapshotSource;
use crate::store::CacheStore;
use crate::tree::MerkleTree;

/// Snapshot of a built tree: everything needed to answer lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// `0x`-prefixed root hash
    pub root: String,

    /// Proof per lower-cased address
    pub proofs: BTreeMap<String, Vec<String>>,

    /// Leaves in canonical order
    pub leaves: Vec<Leaf>,

    /// Build time, Unix milliseconds
    pub timestamp: i64,

    /// Snapshot rows dropped by normalization
    #[serde(default)]
    pub rejected: usize,
}

impl CacheEntry {
    pub fn from_tree(tree: &MerkleTree, rejected: usize, timestamp: i64) -> Self {
        let proofs = tree
            .leaves()
            .iter()
            .zip(tree.proofs())
            .map(|(leaf, proof)| {
                (
                    leaf.address.clone(),
                    proof.iter().map(hex_encode).collect(),
                )
            })
            .collect();

        Self {
            root: tree.root_hex(),
            proofs,
            leaves: tree.leaves().to_vec(),
            timestamp,
            rejected,
        }
    }

    /// Structural check of an entry read back from storage.
    ///
    /// Leaves must be strictly ordered by address with integral values, every
    /// leaf must have a proof, and all hashes must be 32 bytes.
    pub fn validate(&self) -> Result<()> {
        parse_hash(&self.root)
            .map_err(|e| Error::CacheReadCorrupt(format!("root: {}", e)))?;

        if self.leaves.is_empty() {
            return Err(Error::CacheReadCorrupt("entry has no leaves".to_string()));
        }
        if self.proofs.len() != self.leaves.len() {
            return Err(Error::CacheReadCorrupt(format!(
                "{} proofs for {} leaves",
                self.proofs.len(),
                self.leaves.len()
            )));
        }
        for pair in self.leaves.windows(2) {
            if pair[0].address >= pair[1].address {
                return Err(Error::CacheReadCorrupt(format!(
                    "leaves out of order at {}",
                    pair[1].address
                )));
            }
        }
        for leaf in &self.leaves {
            leaf.amount()
                .map_err(|e| Error::CacheReadCorrupt(e.to_string()))?;
            let proof = self.proofs.get(&leaf.address).ok_or_else(|| {
                Error::CacheReadCorrupt(format!("missing proof for {}", leaf.address))
            })?;
            for node in proof {
                parse_hash(node).map_err(|e| {
                    Error::CacheReadCorrupt(format!("proof for {}: {}", leaf.address, e))
                })?;
            }
        }
        Ok(())
    }

    /// Finds the leaf for an already normalized address.
    pub fn find(&self, address: &str) -> Option<&Leaf> {
        self.leaves
            .binary_search_by(|leaf| leaf.address.as_str().cmp(address))
            .ok()
            .map(|index| &self.leaves[index])
    }

    /// Age in milliseconds at `now_ms`. Negative when the timestamp lies in
    /// the future.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.timestamp)
    }

    /// Fresh while `0 <= age < expiry`. A timestamp from the future never
    /// counts as fresh.
    pub fn is_fresh_at(&self, now_ms: i64, expiry: Duration) -> bool {
        let age = self.age_ms(now_ms);
        let expiry_ms = i64::try_from(expiry.as_millis()).unwrap_or(i64::MAX);
        (0..expiry_ms).contains(&age)
    }
}

/// Observable cache state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheState {
    Empty,
    Building,
    Fresh,
    Stale,
}

/// Tuning for [`TreeCache`]
#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    pub expiry: Duration,
    pub build_wait: Duration,
    pub normalize: NormalizeOptions,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(3600),
            build_wait: Duration::from_secs(10),
            normalize: NormalizeOptions::default(),
        }
    }
}

/// Owner of the claim tree for one process.
pub struct TreeCache<S, St> {
    source: S,
    store: St,
    options: CacheOptions,
    slot: RwLock<Option<Arc<CacheEntry>>>,
    invalidated: AtomicBool,
    building: Mutex<bool>,
    build_done: Condvar,
}

/// Result of trying to take the build slot
enum Turn<'a, S, St> {
    Build(BuildGuard<'a, S, St>),
    Serve(Arc<CacheEntry>),
}

/// Releases the build slot and wakes waiters, even if the build panics
struct BuildGuard<'a, S, St> {
    cache: &'a TreeCache<S, St>,
}

impl<S, St> Drop for BuildGuard<'_, S, St> {
    fn drop(&mut self) {
        *self.cache.building.lock() = false;
        self.cache.build_done.notify_all();
    }
}

impl<S, St> TreeCache<S, St>
where
    S: SnapshotSource,
    St: CacheStore,
{
    pub fn new(source: S, store: St, options: CacheOptions) -> Self {
        Self {
            source,
            store,
            options,
            slot: RwLock::new(None),
            invalidated: AtomicBool::new(false),
            building: Mutex::new(false),
            build_done: Condvar::new(),
        }
    }

    /// Returns a fresh entry, loading or rebuilding it when needed.
    ///
    /// A failed rebuild falls back to the previous entry when one exists; the
    /// error only reaches the caller when there is nothing to serve.
    pub fn get(&self) -> Result<Arc<CacheEntry>> {
        let mut previous = self.peek();
        if let Some(entry) = previous.as_ref().filter(|entry| self.is_fresh(entry)) {
            debug!("Serving Merkle tree from memory");
            return Ok(Arc::clone(entry));
        }

        if previous.is_none() {
            if let Some(entry) = self.load_durable() {
                let entry = Arc::new(entry);
                if self.is_fresh(&entry) {
                    info!("Restored Merkle tree {} from storage", entry.root);
                    *self.slot.write() = Some(Arc::clone(&entry));
                    return Ok(entry);
                }
                previous = Some(entry);
            }
        }

        let guard = match self.take_turn(previous.as_ref())? {
            Turn::Serve(entry) => return Ok(entry),
            Turn::Build(guard) => guard,
        };

        let result = self.build_and_install();
        drop(guard);

        match (result, previous) {
            (Ok(entry), _) => Ok(entry),
            (Err(e), Some(entry)) => {
                warn!("Merkle tree rebuild failed, serving previous root {}: {}", entry.root, e);
                Ok(entry)
            }
            (Err(e), None) => Err(e),
        }
    }

    /// Forces a rebuild regardless of freshness.
    ///
    /// Waits for an in-flight build to finish first. On failure the previous
    /// entry stays in place and the error is returned.
    pub fn rebuild(&self) -> Result<Arc<CacheEntry>> {
        let deadline = Instant::now() + self.options.build_wait;
        let mut building = self.building.lock();
        while *building {
            if self.build_done.wait_until(&mut building, deadline).timed_out() && *building {
                return Err(self.build_in_progress());
            }
        }
        *building = true;
        drop(building);

        let _guard = BuildGuard { cache: self };
        self.build_and_install()
    }

    /// Marks the current entry stale so the next `get` rebuilds. The entry is
    /// kept to serve readers while that rebuild runs.
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
        info!("Merkle tree cache invalidated");
    }

    /// In-memory entry, fresh or not, without triggering any work
    pub fn peek(&self) -> Option<Arc<CacheEntry>> {
        self.slot.read().clone()
    }

    pub fn state(&self) -> CacheState {
        if *self.building.lock() {
            return CacheState::Building;
        }
        match self.peek() {
            None => CacheState::Empty,
            Some(entry) if self.is_fresh(&entry) => CacheState::Fresh,
            Some(_) => CacheState::Stale,
        }
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        !self.invalidated.load(Ordering::Acquire)
            && entry.is_fresh_at(Utc::now().timestamp_millis(), self.options.expiry)
    }

    fn load_durable(&self) -> Option<CacheEntry> {
        let loaded = self
            .store
            .read()
            .and_then(|entry| entry.map(|e| e.validate().map(|_| e)).transpose());
        match loaded {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Ignoring unusable Merkle tree cache: {}", e);
                None
            }
        }
    }

    /// Claims the build slot, or decides what to serve instead.
    ///
    /// The slot is checked again under the build lock: a build that finished
    /// after the caller looked must not be repeated.
    fn take_turn(&self, previous: Option<&Arc<CacheEntry>>) -> Result<Turn<'_, S, St>> {
        let deadline = Instant::now() + self.options.build_wait;
        let mut building = self.building.lock();

        loop {
            if let Some(entry) = self.peek().filter(|entry| self.is_fresh(entry)) {
                debug!("Merkle tree {} was rebuilt meanwhile", entry.root);
                return Ok(Turn::Serve(entry));
            }
            if !*building {
                break;
            }
            if let Some(entry) = previous {
                debug!("Build in progress, serving previous root {}", entry.root);
                return Ok(Turn::Serve(Arc::clone(entry)));
            }
            if self.build_done.wait_until(&mut building, deadline).timed_out() && *building {
                return Err(self.build_in_progress());
            }
        }

        *building = true;
        Ok(Turn::Build(BuildGuard { cache: self }))
    }

    fn build_in_progress(&self) -> Error {
        Error::BuildInProgress {
            retry_after_ms: u64::try_from(self.options.build_wait.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// normalize -> build -> proofs -> persist -> swap. Must hold the build slot.
    fn build_and_install(&self) -> Result<Arc<CacheEntry>> {
        let started = Instant::now();
        let was_invalidated = self.invalidated.swap(false, Ordering::AcqRel);

        let result = self.build_entry();
        let entry = match result {
            Ok(entry) => Arc::new(entry),
            Err(e) => {
                if was_invalidated {
                    self.invalidated.store(true, Ordering::Release);
                }
                warn!("Merkle tree build failed: {}", e);
                return Err(e);
            }
        };

        if let Err(e) = self.store.write(&entry) {
            warn!("Failed to persist Merkle tree cache: {}", e);
        }
        *self.slot.write() = Some(Arc::clone(&entry));

        info!(
            root = %entry.root,
            leaves = entry.leaves.len(),
            rejected = entry.rejected,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Merkle tree built"
        );
        Ok(entry)
    }

    fn build_entry(&self) -> Result<CacheEntry> {
        let records = self.source.load()?;
        let snapshot = normalize_records(&records, &self.options.normalize);
        let rejected = snapshot.rejected_count();
        if snapshot.leaves.is_empty() {
            return Err(Error::EmptySnapshot { rejected });
        }

        let tree = MerkleTree::build(snapshot.leaves)?;
        Ok(CacheEntry::from_tree(
            &tree,
            rejected,
            Utc::now().timestamp_millis(),
        ))
    }
}
