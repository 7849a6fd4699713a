//! # SHA256 Precompile (0x02)

use super::Precompile;
use crate::errors::PrecompileError;
use sha2::{Digest, Sha256};

const SHA256_BASE_GAS: u64 = 60;
const SHA256_WORD_GAS: u64 = 12;

/// The SHA-256 hash precompile.
pub struct Sha256Hash;

impl Precompile for Sha256Hash {
    fn required_gas(&self, input: &[u8]) -> u64 {
        SHA256_BASE_GAS + SHA256_WORD_GAS * (input.len() as u64).div_ceil(32)
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
        Ok(Sha256::digest(input).to_vec())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        // sha256("") = e3b0c44298fc1c14...
        let out = Sha256Hash.run(&[]).unwrap();
        assert_eq!(out.len(), 32);
        assert_eq!(&out[..4], &[0xe3, 0xb0, 0xc4, 0x42]);
    }

    #[test]
    fn test_known_vector() {
        // sha256("abc") = ba7816bf8f01cfea...
        let out = Sha256Hash.run(b"abc").unwrap();
        assert_eq!(&out[..4], &[0xba, 0x78, 0x16, 0xbf]);
    }

    #[test]
    fn test_gas() {
        assert_eq!(Sha256Hash.required_gas(&[]), 60);
        assert_eq!(Sha256Hash.required_gas(&[0u8; 32]), 72);
        assert_eq!(Sha256Hash.required_gas(&[0u8; 33]), 84);
    }
}
