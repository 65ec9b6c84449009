use std::io;

use thiserror::Error;

/// Errors produced while building, caching and serving the claim tree
#[derive(Error, Debug)]
pub enum Error {
    /// A snapshot row or leaf could not be normalized
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The same address appears twice with different values
    #[error("Duplicate address {address}: values {first} and {second}")]
    DuplicateAddress {
        address: String,
        first: String,
        second: String,
    },

    /// No valid leaves remained after normalization
    #[error("Snapshot contains no valid leaves ({rejected} records rejected)")]
    EmptySnapshot { rejected: usize },

    /// The durable cache could not be read or parsed
    #[error("Cache read corrupt: {0}")]
    CacheReadCorrupt(String),

    /// A rebuild is running and there is no previous tree to serve
    #[error("Merkle tree build in progress, retry after {retry_after_ms}ms")]
    BuildInProgress { retry_after_ms: u64 },

    /// Malformed hex hash
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// The snapshot collaborator failed to produce rows
    #[error("Snapshot source error: {0}")]
    Snapshot(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<csv::Error> for Error {
    fn from(error: csv::Error) -> Self {
        Error::Snapshot(error.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
