use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheOptions;
use crate::error::{Error, Result};
use crate::normalize::NormalizeOptions;

/// Service configuration, loaded from a JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the built tree is persisted
    pub cache_path: PathBuf,

    /// Age after which a cached tree is rebuilt
    pub expiry_secs: u64,

    /// Longest a lookup waits for an in-flight first build
    pub build_wait_ms: u64,

    pub snapshot: SnapshotConfig,

    pub normalize: NormalizeOptions,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
}

/// Layout of the snapshot export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub path: PathBuf,
    pub delimiter: char,
    pub has_headers: bool,
    pub address_column: usize,
    pub balance_column: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("public/snapshot.csv"),
            delimiter: ';',
            has_headers: true,
            address_column: 0,
            balance_column: 3,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from("merkle-cache.json"),
            expiry_secs: 3600,
            build_wait_ms: 10_000,
            snapshot: SnapshotConfig::default(),
            normalize: NormalizeOptions::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;

        Ok(config)
    }

    /// Save config to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, json)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.expiry_secs == 0 {
            return Err(Error::Config("expiry_secs must be positive".to_string()));
        }
        if !self.snapshot.delimiter.is_ascii() {
            return Err(Error::Config(format!(
                "snapshot delimiter {:?} is not a single-byte character",
                self.snapshot.delimiter
            )));
        }
        if self.snapshot.address_column == self.snapshot.balance_column {
            return Err(Error::Config(
                "address and balance columns must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            expiry: Duration::from_secs(self.expiry_secs),
            build_wait: Duration::from_millis(self.build_wait_ms),
            normalize: self.normalize,
        }
    }
}
