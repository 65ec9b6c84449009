//! Canonicalization of raw snapshot rows into claim leaves.
//!
//! Addresses are trimmed and lower-cased. Balances arrive in whatever shape the
//! snapshot export produced (grouping separators, locale decimal marks,
//! surrounding whitespace) and are turned into an integral smallest-unit
//! amount written as a base-10 string. Rows that cannot be normalized are
//! dropped and reported back to the caller.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::leaf::Leaf;

/// One row as delivered by the snapshot collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub address: String,
    pub balance: String,
}

impl RawRecord {
    pub fn new(address: impl Into<String>, balance: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            balance: balance.into(),
        }
    }
}

/// Character separating the integer and fractional parts of a balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecimalMark {
    /// `1.234.567,89`
    Comma,
    /// `1,234,567.89`
    Dot,
}

impl DecimalMark {
    fn mark(self) -> char {
        match self {
            DecimalMark::Comma => ',',
            DecimalMark::Dot => '.',
        }
    }

    fn grouping(self) -> char {
        match self {
            DecimalMark::Comma => '.',
            DecimalMark::Dot => ',',
        }
    }
}

/// How balances are read from the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    pub decimal_mark: DecimalMark,
    /// Fixed-point scale applied to every balance. A balance of `1,5` with
    /// `decimals = 2` becomes `150`.
    pub decimals: u32,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            decimal_mark: DecimalMark::Comma,
            decimals: 0,
        }
    }
}

/// Why a row was dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    EmptyAddress,
    EmptyBalance,
    ZeroBalance,
    InvalidBalance(String),
}

/// A dropped row together with its position in the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub index: usize,
    pub record: RawRecord,
    pub reason: RejectReason,
}

/// Output of [`normalize_records`]
#[derive(Debug, Clone, Default)]
pub struct NormalizedSnapshot {
    /// Valid leaves in input order
    pub leaves: Vec<Leaf>,
    pub rejected: Vec<Rejected>,
}

impl NormalizedSnapshot {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

/// Trims and lower-cases an address. Returns `None` when nothing is left.
pub fn normalize_address(raw: &str) -> Option<String> {
    let address = raw.trim().to_lowercase();
    if address.is_empty() {
        None
    } else {
        Some(address)
    }
}

/// Converts a raw balance into a canonical integral decimal string.
///
/// Grouping separators and whitespace are removed, the locale decimal mark is
/// applied and the amount is scaled by `options.decimals`. Fractional digits
/// beyond the scale are only accepted when they are zeros; anything else
/// would lose precision and is rejected.
///
/// # Errors
/// Returns `InvalidRecord` for empty, signed, non-numeric or out of range
/// (larger than `uint256`) balances.
pub fn normalize_balance(raw: &str, options: &NormalizeOptions) -> Result<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != options.decimal_mark.grouping())
        .collect();
    if cleaned.is_empty() {
        return Err(Error::InvalidRecord("empty balance".to_string()));
    }

    let mut parts = cleaned.splitn(2, options.decimal_mark.mark());
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next().unwrap_or_default();

    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fraction) || (whole.is_empty() && fraction.is_empty()) {
        return Err(Error::InvalidRecord(format!("non-numeric balance '{}'", raw.trim())));
    }

    let scale = options.decimals as usize;
    let significant = fraction.trim_end_matches('0');
    if significant.len() > scale {
        return Err(Error::InvalidRecord(format!(
            "balance '{}' has more than {} fractional digits",
            raw.trim(),
            scale
        )));
    }

    let mut digits = String::with_capacity(whole.len() + scale);
    digits.push_str(whole);
    digits.push_str(significant);
    digits.extend(std::iter::repeat('0').take(scale - significant.len()));
    if digits.is_empty() {
        digits.push('0');
    }

    let amount = U256::from_dec_str(&digits)
        .map_err(|_| Error::InvalidRecord(format!("balance '{}' exceeds uint256", raw.trim())))?;
    Ok(amount.to_string())
}

/// Normalizes every row, keeping the valid ones and recording the rest.
///
/// Ordering of the output is not meaningful; the tree builder sorts.
pub fn normalize_records(records: &[RawRecord], options: &NormalizeOptions) -> NormalizedSnapshot {
    let mut snapshot = NormalizedSnapshot::default();

    for (index, record) in records.iter().enumerate() {
        let reject = |reason: RejectReason| Rejected {
            index,
            record: record.clone(),
            reason,
        };

        let Some(address) = normalize_address(&record.address) else {
            snapshot.rejected.push(reject(RejectReason::EmptyAddress));
            continue;
        };

        if record.balance.trim().is_empty() {
            snapshot.rejected.push(reject(RejectReason::EmptyBalance));
            continue;
        }

        match normalize_balance(&record.balance, options) {
            Ok(value) if value == "0" => {
                snapshot.rejected.push(reject(RejectReason::ZeroBalance));
            }
            Ok(value) => snapshot.leaves.push(Leaf { address, value }),
            Err(e) => {
                debug!("Rejecting row {} ({}): {}", index, record.address.trim(), e);
                snapshot
                    .rejected
                    .push(reject(RejectReason::InvalidBalance(e.to_string())));
            }
        }
    }

    if !snapshot.rejected.is_empty() {
        warn!(
            "Normalization rejected {} of {} snapshot records",
            snapshot.rejected.len(),
            records.len()
        );
    }

    snapshot
}
