use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::common::{keccak256, Hash};
use crate::error::{Error, Result};

/// One claim entry committed into the tree.
///
/// `address` is the lower-cased claim identity and `value` the integral
/// smallest-unit amount as a base-10 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    pub address: String,
    pub value: String,
}

impl Leaf {
    pub fn new(address: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            value: value.into(),
        }
    }

    /// Parses the value as a `uint256`.
    pub fn amount(&self) -> Result<U256> {
        if self.value.is_empty() || !self.value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidRecord(format!(
                "leaf {} has non-integral value '{}'",
                self.address, self.value
            )));
        }
        U256::from_dec_str(&self.value).map_err(|_| {
            Error::InvalidRecord(format!(
                "leaf {} value '{}' exceeds uint256",
                self.address, self.value
            ))
        })
    }

    /// Solidity `abi.encode(string address, uint256 value)`.
    ///
    /// Layout: offset of the string (0x40), the value word, the string
    /// length word, then the UTF-8 bytes right-padded to a 32-byte boundary.
    /// The identity is always encoded as a string, even when it spells an EVM
    /// address; a contract hashing `(address, uint256)` cannot verify it.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let amount = self.amount()?;
        let data = self.address.as_bytes();
        let padded_len = data.len().div_ceil(32) * 32;

        let mut encoded = Vec::with_capacity(96 + padded_len);
        encoded.extend_from_slice(&u256_word(U256::from(64u64)));
        encoded.extend_from_slice(&u256_word(amount));
        encoded.extend_from_slice(&u256_word(U256::from(data.len() as u64)));
        encoded.extend_from_slice(data);
        encoded.resize(96 + padded_len, 0);
        Ok(encoded)
    }

    /// Leaf hash: `keccak256(keccak256(abi.encode(address, value)))`.
    ///
    /// Hashing twice keeps a leaf from ever being mistaken for an internal
    /// node, which is what the OpenZeppelin standard tree does.
    pub fn hash(&self) -> Result<Hash> {
        Ok(keccak256(&keccak256(&self.encode()?)))
    }
}

fn u256_word(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let leaf = Leaf::new("abc", "256");
        let encoded = leaf.encode().unwrap();

        assert_eq!(encoded.len(), 128);
        assert_eq!(encoded[31], 0x40);
        assert_eq!(&encoded[..31], &[0u8; 31]);
        assert_eq!(encoded[62], 1);
        assert_eq!(encoded[63], 0);
        assert_eq!(encoded[95], 3);
        assert_eq!(&encoded[96..99], b"abc");
        assert!(encoded[99..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_encode_pads_to_word_boundary() {
        let exact = Leaf::new("a".repeat(32), "1").encode().unwrap();
        assert_eq!(exact.len(), 128);

        let spill = Leaf::new("a".repeat(33), "1").encode().unwrap();
        assert_eq!(spill.len(), 160);
    }

    #[test]
    fn test_hash_is_double_keccak() {
        let leaf = Leaf::new("addr1", "100");
        let encoded = leaf.encode().unwrap();
        assert_eq!(leaf.hash().unwrap(), keccak256(&keccak256(&encoded)));
    }

    #[test]
    fn test_hash_binds_address_and_value() {
        let base = Leaf::new("addr1", "100").hash().unwrap();
        assert_ne!(base, Leaf::new("addr2", "100").hash().unwrap());
        assert_ne!(base, Leaf::new("addr1", "101").hash().unwrap());
    }

    #[test]
    fn test_evm_address_is_encoded_as_string() {
        let address = "0x5b38da6a701c568545dcfcb03fcb875f56beddc4";
        let leaf = Leaf::new(address, "100");
        let encoded = leaf.encode().unwrap();

        // 42 ASCII bytes behind a length word, not one 20-byte address word
        assert_eq!(encoded.len(), 160);
        assert_eq!(encoded[95], 42);
        assert_eq!(&encoded[96..138], address.as_bytes());

        let mut address_word = [0u8; 32];
        address_word[12..].copy_from_slice(&hex::decode(&address[2..]).unwrap());
        let mut address_keyed = address_word.to_vec();
        address_keyed.extend_from_slice(&u256_word(U256::from(100u64)));
        assert_ne!(
            leaf.hash().unwrap(),
            keccak256(&keccak256(&address_keyed))
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Leaf::new("a", "").hash().is_err());
        assert!(Leaf::new("a", "1.5").hash().is_err());
        assert!(Leaf::new("a", "-1").hash().is_err());
        assert!(Leaf::new("a", "9".repeat(80)).hash().is_err());
    }
}
