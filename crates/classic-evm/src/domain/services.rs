//! # Domain Services
//!
//! Pure, deterministic helpers: hashing and contract address derivation.

use crate::domain::value_objects::{Address, Hash};
use sha3::{Digest, Keccak256};

// =============================================================================
// KECCAK256
// =============================================================================

/// Computes the Keccak-256 hash of `data`.
#[must_use]
pub fn keccak256(data: &[u8]) -> Hash {
    Hash::new(Keccak256::digest(data).into())
}

/// Keccak-256 of the empty byte string (the code hash of an EOA).
#[must_use]
pub fn empty_code_hash() -> Hash {
    keccak256(&[])
}

// =============================================================================
// CONTRACT ADDRESS DERIVATION
// =============================================================================

/// Address of a contract deployed by CREATE.
///
/// `keccak256(rlp([sender, nonce]))[12..]`
#[must_use]
pub fn create_address(sender: Address, nonce: u64) -> Address {
    let mut stream = rlp::RlpStream::new_list(2);
    stream.append(&sender.as_bytes().to_vec());
    stream.append(&nonce);

    let hash = Keccak256::digest(stream.out());
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..32]);
    Address::new(addr)
}

/// Address of a contract deployed by CREATE2.
///
/// `keccak256(0xff ++ sender ++ salt ++ keccak256(init_code))[12..]`
#[must_use]
pub fn create2_address(sender: Address, salt: Hash, init_code: &[u8]) -> Address {
    let code_hash = Keccak256::digest(init_code);

    let mut data = Vec::with_capacity(85);
    data.push(0xff);
    data.extend_from_slice(sender.as_bytes());
    data.extend_from_slice(salt.as_bytes());
    data.extend_from_slice(&code_hash);

    let hash = Keccak256::digest(&data);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..32]);
    Address::new(addr)
}

/// Address belonging to an uncompressed secp256k1 public key (64 bytes,
/// without the 0x04 prefix): `keccak256(pubkey)[12..]`.
#[must_use]
pub fn address_from_pubkey(public_key: &[u8]) -> Address {
    let hash = Keccak256::digest(public_key);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..32]);
    Address::new(addr)
}

// =============================================================================
// TESTS
// =============================================================================
