//! # Identity Precompile (0x04)

use super::Precompile;
use crate::errors::PrecompileError;

const IDENTITY_BASE_GAS: u64 = 15;
const IDENTITY_WORD_GAS: u64 = 3;

/// The data-copy precompile: output equals input.
pub struct Identity;

impl Precompile for Identity {
    fn required_gas(&self, input: &[u8]) -> u64 {
        IDENTITY_BASE_GAS + IDENTITY_WORD_GAS * (input.len() as u64).div_ceil(32)
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
        Ok(input.to_vec())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_law() {
        assert!(Identity.run(&[]).unwrap().is_empty());
        let data = vec![1, 2, 3, 4, 5];
        assert_eq!(Identity.run(&data).unwrap(), data);
    }

    #[test]
    fn test_gas() {
        assert_eq!(Identity.required_gas(&[]), 15);
        assert_eq!(Identity.required_gas(&[0u8; 1]), 18);
        assert_eq!(Identity.required_gas(&[0u8; 64]), 21);
    }
}
