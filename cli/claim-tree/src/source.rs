use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::{ReaderBuilder, Trim};
use tracing::info;

use crate::config::SnapshotConfig;
use crate::error::{Error, Result};
use crate::normalize::RawRecord;

/// Producer of raw snapshot rows
pub trait SnapshotSource: Send + Sync {
    fn load(&self) -> Result<Vec<RawRecord>>;
}

impl<T: SnapshotSource + ?Sized> SnapshotSource for Arc<T> {
    fn load(&self) -> Result<Vec<RawRecord>> {
        (**self).load()
    }
}

/// Fixed in-memory rows
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: Vec<RawRecord>,
}

impl StaticSource {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }
}

impl SnapshotSource for StaticSource {
    fn load(&self) -> Result<Vec<RawRecord>> {
        Ok(self.records.clone())
    }
}

/// Delimited snapshot export.
///
/// Only the address and balance columns are read. Rows too short to hold
/// either column produce empty fields, which the normalizer rejects and
/// counts.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    delimiter: u8,
    has_headers: bool,
    address_column: usize,
    balance_column: usize,
}

impl CsvSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::from_config(&SnapshotConfig {
            path: path.as_ref().to_path_buf(),
            ..SnapshotConfig::default()
        })
    }

    pub fn from_config(config: &SnapshotConfig) -> Self {
        Self {
            path: config.path.clone(),
            delimiter: config.delimiter as u8,
            has_headers: config.has_headers,
            address_column: config.address_column,
            balance_column: config.balance_column,
        }
    }
}

impl SnapshotSource for CsvSource {
    fn load(&self) -> Result<Vec<RawRecord>> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_headers)
            .flexible(true)
            .trim(Trim::All)
            .from_path(&self.path)
            .map_err(|e| Error::Snapshot(format!("failed to open {:?}: {}", self.path, e)))?;

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            if row.iter().all(|field| field.is_empty()) {
                continue;
            }
            records.push(RawRecord {
                address: row.get(self.address_column).unwrap_or_default().to_string(),
                balance: row.get(self.balance_column).unwrap_or_default().to_string(),
            });
        }

        info!("Read {} snapshot rows from {:?}", records.len(), self.path);
        Ok(records)
    }
}
