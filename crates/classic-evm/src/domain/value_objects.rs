//! # Value Objects
//!
//! Immutable primitives shared by the whole machine: addresses, hashes,
//! storage slots and byte buffers. These types are defined by their value,
//! not identity.

use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export the 256-bit integers used for all word arithmetic.
pub use primitive_types::{U256, U512};

// =============================================================================
// ADDRESS (20 bytes)
// =============================================================================

/// A 20-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address (0x0000...0000).
    pub const ZERO: Self = Self([0u8; 20]);

    /// Creates an address from a 20-byte array.
    #[must_use]
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Creates an address from a slice. Returns None if the length is wrong.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() == 20 {
            let mut bytes = [0u8; 20];
            bytes.copy_from_slice(slice);
            Some(Self(bytes))
        } else {
            None
        }
    }

    /// Creates an address from the low 20 bytes of a 256-bit word.
    #[must_use]
    pub fn from_word(word: U256) -> Self {
        let mut bytes = [0u8; 32];
        word.to_big_endian(&mut bytes);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&bytes[12..32]);
        Self(addr)
    }

    /// Widens the address to a 256-bit word, left-padded with zeros.
    #[must_use]
    pub fn to_word(&self) -> U256 {
        let mut bytes = [0u8; 32];
        bytes[12..].copy_from_slice(&self.0);
        U256::from_big_endian(&bytes)
    }

    /// Returns the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns true if this is the zero address.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "...")?;
        for byte in &self.0[18..] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl From<Address> for [u8; 20] {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

// =============================================================================
// HASH (32 bytes)
// =============================================================================

/// A 32-byte hash (Keccak-256 unless stated otherwise).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The zero hash.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Creates a hash from a 32-byte array.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Creates a hash from a slice. Returns None if the length is wrong.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() == 32 {
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(slice);
            Some(Self(bytes))
        } else {
            None
        }
    }

    /// Returns the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Widens the hash to a 256-bit word.
    #[must_use]
    pub fn to_word(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// Returns true if this is the zero hash.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<Hash> for [u8; 32] {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

// =============================================================================
// STORAGE KEY & VALUE (32 bytes each)
// =============================================================================

/// A 32-byte storage slot key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct StorageKey(pub [u8; 32]);

impl StorageKey {
    /// The zero key.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Creates a storage key from a 32-byte array.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Creates a storage key from a U256.
    #[must_use]
    pub fn from_u256(value: U256) -> Self {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        Self(bytes)
    }

    /// Converts to U256.
    #[must_use]
    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// Returns the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey(0x")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "...)")
    }
}

impl From<U256> for StorageKey {
    fn from(value: U256) -> Self {
        Self::from_u256(value)
    }
}

/// A 32-byte storage slot value. An absent slot reads as zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StorageValue(pub [u8; 32]);

impl StorageValue {
    /// The zero value.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Creates a storage value from a 32-byte array.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Creates a storage value from a U256.
    #[must_use]
    pub fn from_u256(value: U256) -> Self {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        Self(bytes)
    }

    /// Converts to U256.
    #[must_use]
    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// Returns the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns true if this is the zero value.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for StorageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageValue({})", self.to_u256())
    }
}

impl From<U256> for StorageValue {
    fn from(value: U256) -> Self {
        Self::from_u256(value)
    }
}

// =============================================================================
// BYTES (variable length)
// =============================================================================

/// Variable-length byte vector for calldata, return data and code.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    /// Creates an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Creates a buffer from a vector.
    #[must_use]
    pub fn from_vec(vec: Vec<u8>) -> Self {
        Self(vec)
    }

    /// Creates a buffer from a slice.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Self {
        Self(slice.to_vec())
    }

    /// Returns the underlying vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Returns a reference to the underlying slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() <= 8 {
            write!(f, "0x")?;
            for byte in &self.0 {
                write!(f, "{byte:02x}")?;
            }
        } else {
            write!(f, "0x")?;
            for byte in &self.0[..4] {
                write!(f, "{byte:02x}")?;
            }
            write!(f, "..({} bytes)", self.0.len())?;
        }
        Ok(())
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(vec: Vec<u8>) -> Self {
        Self(vec)
    }
}

impl From<&[u8]> for Bytes {
    fn from(slice: &[u8]) -> Self {
        Self(slice.to_vec())
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_zero() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::new([1u8; 20]).is_zero());
    }

    #[test]
    fn test_address_word_round_trip() {
        let addr = Address::new([0xAB; 20]);
        assert_eq!(Address::from_word(addr.to_word()), addr);

        // The top 12 bytes of the word are discarded.
        let word = U256::MAX;
        let addr = Address::from_word(word);
        assert_eq!(addr, Address::new([0xFF; 20]));
    }

    #[test]
    fn test_storage_value_u256_conversion() {
        let value = U256::from(42);
        let slot = StorageValue::from_u256(value);
        assert_eq!(slot.to_u256(), value);
        assert!(!slot.is_zero());
        assert!(StorageValue::ZERO.is_zero());
    }

    #[test]
    fn test_storage_key_u256_conversion() {
        let key = StorageKey::from_u256(U256::from(7));
        assert_eq!(key.to_u256(), U256::from(7));
    }

    #[test]
    fn test_bytes_debug_truncation() {
        let short = Bytes::from_slice(&[1, 2, 3]);
        assert_eq!(format!("{short:?}"), "0x010203");

        let long = Bytes::from_vec(vec![0x11; 32]);
        assert!(format!("{long:?}").contains("(32 bytes)"));
    }
}
