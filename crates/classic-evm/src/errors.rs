//! # Error Types
//!
//! The error taxonomy observed by the interpreter and its drivers.

use crate::domain::value_objects::{Address, StorageKey, U256};
use thiserror::Error;

// =============================================================================
// REQUIRE (step-mode data requests)
// =============================================================================

/// A datum the machine needs before it can continue.
///
/// Only surfaces in step-mode execution, where the driver owns the state.
/// An embedded host resolves every lookup immediately, so embedded runs
/// never observe one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Require {
    /// Account summary (nonce, balance, code hash) for an address.
    Account(Address),
    /// Code bytes for an address.
    Code(Address),
    /// One storage slot of an address.
    Storage(Address, StorageKey),
    /// Hash of an ancestor block.
    BlockHash(u64),
    /// Block context and transaction environment.
    Info,
}

// =============================================================================
// VM ERRORS
// =============================================================================

/// Errors that can abort a frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    /// A gas charge exceeded the remaining gas of the frame.
    #[error("out of gas")]
    OutOfGas,

    /// Pop or peek past the bottom of the stack.
    #[error("stack underflow")]
    StackUnderflow,

    /// Push beyond 1024 entries.
    #[error("stack overflow")]
    StackOverflow,

    /// JUMP/JUMPI to a position that is not a reachable JUMPDEST.
    #[error("invalid jump destination: {0}")]
    InvalidJumpDestination(usize),

    /// Opcode with no valid table entry for the active fork.
    #[error("invalid opcode: 0x{0:02x}")]
    InvalidOpcode(u8),

    /// State-modifying opcode inside a static call.
    #[error("write protection")]
    WriteProtection,

    /// RETURNDATACOPY window past the end of the return buffer.
    #[error("return data out of bounds: offset {offset}, size {size}, available {available}")]
    ReturnDataOutOfBounds {
        /// Requested start offset.
        offset: usize,
        /// Requested length.
        size: usize,
        /// Length of the current return buffer.
        available: usize,
    },

    /// CREATE could not pay the per-byte deposit for the produced code.
    /// Fatal from Homestead onward; Frontier keeps the account with no code.
    #[error("contract creation code storage out of gas")]
    CodeStoreOutOfGas,

    /// Nested call or create past the 1024-frame limit.
    #[error("call depth limit reached")]
    CallDepthExceeded,

    /// Value transfer with insufficient balance.
    #[error("insufficient balance for transfer: required {required}, available {available}")]
    TransferFailed {
        /// Amount that was to be moved.
        required: U256,
        /// Balance of the paying account.
        available: U256,
    },

    /// Execution paused: the host has not supplied this datum yet.
    #[error("missing required data: {0:?}")]
    Require(Require),
}

impl VmError {
    /// True when the error must surface to the driver instead of being
    /// absorbed as a failed sub-call.
    #[must_use]
    pub fn is_require(&self) -> bool {
        matches!(self, Self::Require(_))
    }
}

// =============================================================================
// PRECOMPILE ERRORS
// =============================================================================

/// Errors from precompiled contract execution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrecompileError {
    /// The requested gas does not cover the computed cost.
    #[error("precompile out of gas")]
    OutOfGas,

    /// Malformed input the precompile rejects outright.
    #[error("invalid precompile input: {0}")]
    InvalidInput(&'static str),
}

impl From<PrecompileError> for VmError {
    fn from(err: PrecompileError) -> Self {
        match err {
            PrecompileError::OutOfGas => VmError::OutOfGas,
            // A rejecting precompile behaves like any other failed frame.
            PrecompileError::InvalidInput(_) => VmError::OutOfGas,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_error_display() {
        assert_eq!(VmError::OutOfGas.to_string(), "out of gas");
        assert_eq!(
            VmError::InvalidOpcode(0xef).to_string(),
            "invalid opcode: 0xef"
        );
        assert_eq!(
            VmError::InvalidJumpDestination(7).to_string(),
            "invalid jump destination: 7"
        );
    }

    #[test]
    fn test_is_require() {
        assert!(VmError::Require(Require::Info).is_require());
        assert!(!VmError::OutOfGas.is_require());
    }

    #[test]
    fn test_precompile_error_conversion() {
        let err: VmError = PrecompileError::OutOfGas.into();
        assert_eq!(err, VmError::OutOfGas);
    }
}
