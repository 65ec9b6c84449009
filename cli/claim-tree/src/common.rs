use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use sha3::{Digest, Keccak256};

use crate::error::{Error, Result};

/// A 32-byte Keccak256 digest
pub type Hash = [u8; 32];

/// Hashes arbitrary bytes with Keccak256.
pub fn keccak256(data: &[u8]) -> Hash {
    Keccak256::digest(data).into()
}

/// Computes the parent of two sibling nodes.
///
/// The pair is sorted before hashing so the result does not depend on which
/// side each node sits on. This is the convention of OpenZeppelin's
/// `MerkleProof.verify`, which only needs the sibling list to check a proof.
///
/// # Arguments
/// * `a` - First 32-byte node
/// * `b` - Second 32-byte node
///
/// # Returns
/// `keccak256(min(a, b) || max(a, b))`
pub fn hash_pair(a: Hash, b: Hash) -> Hash {
    let (left, right) = if a <= b { (a, b) } else { (b, a) };
    let hash = Keccak256::new()
        .chain_update(left)
        .chain_update(right)
        .finalize();
    hash.into()
}

/// Formats a hash as `0x`-prefixed lower-case hex.
pub fn hex_encode(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parses a 32-byte hash from a hex string.
///
/// # Arguments
/// * `hash_str` - The hash, with or without "0x" prefix
///
/// # Errors
/// Returns `InvalidHash` if the input is not 64 hex characters
pub fn parse_hash(hash_str: &str) -> Result<Hash> {
    let trimmed = hash_str.trim();
    let cleaned = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if cleaned.len() != 64 {
        return Err(Error::InvalidHash(format!(
            "expected 64 hex chars, got {}",
            cleaned.len()
        )));
    }
    let mut hash = [0u8; 32];
    hex::decode_to_slice(cleaned, &mut hash)
        .map_err(|e| Error::InvalidHash(format!("invalid hex encoding: {}", e)))?;
    Ok(hash)
}

/// Writes `contents` to `path` through a temporary sibling file and a rename,
/// so readers never observe a half-written file.
pub fn write_file_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}
