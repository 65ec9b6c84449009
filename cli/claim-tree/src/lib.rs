#![forbid(unsafe_code)]

pub mod cache;
pub mod common;
pub mod config;
pub mod error;
pub mod leaf;
pub mod lookup;
pub mod normalize;
pub mod source;
pub mod store;
pub mod tree;

pub use cache::{CacheEntry, CacheOptions, CacheState, TreeCache};
pub use common::{hash_pair, hex_encode, keccak256, parse_hash, write_file_atomic, Hash};
pub use config::{Config, SnapshotConfig};
pub use error::{Error, Result};
pub use leaf::Leaf;
pub use lookup::{ClaimProof, ProofLookup, TreeInfo};
pub use normalize::{
    normalize_address, normalize_balance, normalize_records, DecimalMark, NormalizeOptions,
    NormalizedSnapshot, RawRecord, RejectReason, Rejected,
};
pub use source::{CsvSource, SnapshotSource, StaticSource};
pub use store::{CacheStore, FileStore, MemoryStore};
pub use tree::{verify_claim, verify_proof, MerkleTree};
