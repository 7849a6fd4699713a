//! # Contract Frame
//!
//! One activation record: the code being run, its input, the apparent
//! caller and value, and the frame's gas meter. Created by the call/create
//! orchestration, destroyed when the frame returns.

use crate::domain::value_objects::{Address, Bytes, Hash, U256};
use crate::evm::jumpdest::{CodeBitmap, JumpDestCache};
use std::sync::Arc;

/// The per-frame contract object.
#[derive(Clone, Debug)]
pub struct Contract {
    /// Apparent caller (ancestor frame for DELEGATECALL).
    pub caller: Address,
    /// The storage/context address of this frame.
    pub address: Address,
    /// Where the running code was loaded from; differs from `address` for
    /// CALLCODE and DELEGATECALL.
    pub code_address: Address,
    /// Keccak-256 of `code`, keying the jumpdest cache.
    pub code_hash: Hash,
    /// Immutable code, shared with the state.
    pub code: Arc<Vec<u8>>,
    /// Call input.
    pub input: Bytes,
    /// Apparent value.
    pub value: U256,
    /// Remaining gas of this frame.
    pub gas: u64,
    /// Valid jump destinations, filled in on the first JUMP.
    jumpdests: Option<Arc<CodeBitmap>>,
}

impl Contract {
    /// Creates a frame.
    #[must_use]
    pub fn new(
        caller: Address,
        address: Address,
        code_address: Address,
        code_hash: Hash,
        code: Arc<Vec<u8>>,
        input: Bytes,
        value: U256,
        gas: u64,
    ) -> Self {
        Self {
            caller,
            address,
            code_address,
            code_hash,
            code,
            input,
            value,
            gas,
            jumpdests: None,
        }
    }

    /// Opcode byte at `pc`; positions past the end read as STOP.
    #[must_use]
    pub fn op(&self, pc: usize) -> u8 {
        self.code.get(pc).copied().unwrap_or(0x00)
    }

    /// True when `dest` may be jumped to. Analyzes the code through the
    /// shared cache on first use.
    pub fn valid_jump(&mut self, dest: usize, cache: &mut JumpDestCache) -> bool {
        if self.jumpdests.is_none() {
            self.jumpdests = Some(cache.get(self.code_hash, &self.code));
        }
        self.jumpdests
            .as_ref()
            .is_some_and(|map| map.is_valid(dest))
    }

    /// Deducts `amount` from the meter. On shortfall the meter is zeroed
    /// and false is returned.
    pub fn use_gas(&mut self, amount: u64) -> bool {
        if self.gas < amount {
            self.gas = 0;
            false
        } else {
            self.gas -= amount;
            true
        }
    }

    /// Returns unused gas from a finished sub-call.
    pub fn refund_gas(&mut self, amount: u64) {
        self.gas = self.gas.saturating_add(amount);
    }
}

// =============================================================================
// TESTS
// =============================================================================
