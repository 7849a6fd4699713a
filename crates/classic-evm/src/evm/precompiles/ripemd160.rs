//! # RIPEMD160 Precompile (0x03)
//!
//! The 20-byte digest is returned left-padded to a 32-byte word.

use super::Precompile;
use crate::errors::PrecompileError;
use ripemd::{Digest, Ripemd160};

const RIPEMD160_BASE_GAS: u64 = 600;
const RIPEMD160_WORD_GAS: u64 = 120;

/// The RIPEMD-160 hash precompile.
pub struct Ripemd160Hash;

impl Precompile for Ripemd160Hash {
    fn required_gas(&self, input: &[u8]) -> u64 {
        RIPEMD160_BASE_GAS + RIPEMD160_WORD_GAS * (input.len() as u64).div_ceil(32)
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
        let digest = Ripemd160::digest(input);
        let mut output = vec![0u8; 32];
        output[12..].copy_from_slice(&digest);
        Ok(output)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_is_left_padded() {
        // ripemd160("") = 9c1185a5c5e9fc54...
        let out = Ripemd160Hash.run(&[]).unwrap();
        assert_eq!(out.len(), 32);
        assert_eq!(&out[..12], &[0u8; 12]);
        assert_eq!(&out[12..16], &[0x9c, 0x11, 0x85, 0xa5]);
    }

    #[test]
    fn test_known_vector() {
        // ripemd160("abc") = 8eb208f7e05d987a...
        let out = Ripemd160Hash.run(b"abc").unwrap();
        assert_eq!(&out[12..16], &[0x8e, 0xb2, 0x08, 0xf7]);
    }

    #[test]
    fn test_gas() {
        assert_eq!(Ripemd160Hash.required_gas(&[]), 600);
        assert_eq!(Ripemd160Hash.required_gas(&[0u8; 32]), 720);
        assert_eq!(Ripemd160Hash.required_gas(&[0u8; 64]), 840);
    }
}
