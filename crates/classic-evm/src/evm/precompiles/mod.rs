//! # Precompiled Contracts
//!
//! Native contracts at the low addresses. 0x01-0x04 exist from Frontier;
//! modexp and the bn256 trio arrive with Atlantis.

pub mod bn256;
pub mod ecrecover;
pub mod identity;
pub mod modexp;
pub mod ripemd160;
pub mod sha256;

use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;
use crate::evm::forks::ForkConfig;

/// Result of a precompile invocation.
#[derive(Debug)]
pub struct PrecompileOutput {
    /// Gas debited.
    pub gas_used: u64,
    /// Output bytes.
    pub output: Bytes,
}

/// A contract implemented natively rather than in bytecode.
pub trait Precompile: Send + Sync {
    /// Gas this input costs to process.
    fn required_gas(&self, input: &[u8]) -> u64;

    /// Computes the output. Input validation failures are errors; the
    /// caller treats them like any other failed frame.
    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError>;

    /// Prices and runs in one step.
    ///
    /// # Errors
    ///
    /// `OutOfGas` when `gas_limit` does not cover the cost, or whatever
    /// `run` reports.
    fn execute(&self, input: &[u8], gas_limit: u64) -> Result<PrecompileOutput, PrecompileError> {
        let gas_used = self.required_gas(input);
        if gas_used > gas_limit {
            return Err(PrecompileError::OutOfGas);
        }
        Ok(PrecompileOutput {
            gas_used,
            output: Bytes::from_vec(self.run(input)?),
        })
    }
}

/// Looks up the precompile registered at `address` under `config`, if any.
#[must_use]
pub fn for_address(address: Address, config: &ForkConfig) -> Option<&'static dyn Precompile> {
    if address.0[..19] != [0u8; 19] {
        return None;
    }
    match address.0[19] {
        0x01 => Some(&ecrecover::EcRecover),
        0x02 => Some(&sha256::Sha256Hash),
        0x03 => Some(&ripemd160::Ripemd160Hash),
        0x04 => Some(&identity::Identity),
        0x05 if config.atlantis => Some(&modexp::BigModExp),
        0x06 if config.atlantis => Some(&bn256::Bn256Add),
        0x07 if config.atlantis => Some(&bn256::Bn256ScalarMul),
        0x08 if config.atlantis => Some(&bn256::Bn256Pairing),
        _ => None,
    }
}

/// Builds the precompile address for number `n`.
#[cfg(test)]
pub(crate) fn precompile_address(n: u8) -> Address {
    let mut addr = [0u8; 20];
    addr[19] = n;
    Address::new(addr)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::forks::Fork;

    #[test]
    fn test_registry_per_fork() {
        let homestead = ForkConfig::new(Fork::Homestead);
        let atlantis = ForkConfig::new(Fork::Atlantis);

        for n in 1..=4 {
            assert!(for_address(precompile_address(n), &homestead).is_some());
            assert!(for_address(precompile_address(n), &atlantis).is_some());
        }
        for n in 5..=8 {
            assert!(for_address(precompile_address(n), &homestead).is_none());
            assert!(for_address(precompile_address(n), &atlantis).is_some());
        }
        assert!(for_address(precompile_address(9), &atlantis).is_none());
        assert!(for_address(Address::new([1u8; 20]), &atlantis).is_none());
    }

    #[test]
    fn test_execute_charges_gas() {
        let config = ForkConfig::new(Fork::Atlantis);
        let identity = for_address(precompile_address(4), &config).unwrap();

        let out = identity.execute(b"abc", 100).unwrap();
        assert_eq!(out.gas_used, 18); // 15 + 3 for one word
        assert_eq!(out.output.as_slice(), b"abc");

        let err = identity.execute(b"abc", 17).unwrap_err();
        assert_eq!(err, PrecompileError::OutOfGas);
    }
}
