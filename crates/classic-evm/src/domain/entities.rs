//! # Core Domain Entities
//!
//! Accounts, block context and execution results: the records exchanged
//! between the interpreter, its host and the code driving it.

use crate::domain::value_objects::{Address, Bytes, Hash, U256};
use crate::errors::VmError;
use serde::{Deserialize, Serialize};

// =============================================================================
// ACCOUNT STATE
// =============================================================================

/// The portion of an account visible through the host interface.
///
/// Storage is queried separately, slot by slot; code is queried by address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Account nonce.
    pub nonce: u64,
    /// Account balance in wei.
    pub balance: U256,
    /// Keccak-256 of the account code (the empty code hash for EOAs).
    pub code_hash: Hash,
}

impl AccountState {
    /// Keccak-256 of the empty byte string.
    pub const EMPTY_CODE_HASH: Hash = Hash([
        0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03,
        0xc0, 0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85,
        0xa4, 0x70,
    ]);

    /// Creates an account with no code.
    #[must_use]
    pub fn new_eoa(balance: U256, nonce: u64) -> Self {
        Self {
            nonce,
            balance,
            code_hash: Self::EMPTY_CODE_HASH,
        }
    }

    /// True iff nonce, balance and code are all empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nonce == 0
            && self.balance.is_zero()
            && (self.code_hash == Self::EMPTY_CODE_HASH || self.code_hash == Hash::ZERO)
    }
}

// =============================================================================
// BLOCK CONTEXT
// =============================================================================

/// Block-level inputs, read-only during execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    /// Block number.
    pub number: u64,
    /// Block timestamp (unix seconds).
    pub timestamp: u64,
    /// Coinbase address (block producer).
    pub coinbase: Address,
    /// Block difficulty.
    pub difficulty: U256,
    /// Block gas limit.
    pub gas_limit: u64,
}

impl Default for BlockContext {
    fn default() -> Self {
        Self {
            number: 0,
            timestamp: 0,
            coinbase: Address::ZERO,
            difficulty: U256::zero(),
            gas_limit: 8_000_000,
        }
    }
}

// =============================================================================
// EXECUTION ENVIRONMENT
// =============================================================================

/// Transaction-level inputs shared by every frame of one execution.
#[derive(Clone, Debug, Default)]
pub struct Env {
    /// Transaction sender (ORIGIN).
    pub origin: Address,
    /// Gas price (GASPRICE).
    pub gas_price: U256,
    /// The enclosing block.
    pub block: BlockContext,
}

// =============================================================================
// LOG
// =============================================================================

/// A log record emitted by LOG0..LOG4.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Contract address that emitted the log.
    pub address: Address,
    /// Indexed topics (up to 4).
    pub topics: Vec<Hash>,
    /// Non-indexed data.
    pub data: Bytes,
    /// Number of the block the log was emitted in.
    pub block_number: u64,
}

impl Log {
    /// Creates a new log record.
    #[must_use]
    pub fn new(address: Address, topics: Vec<Hash>, data: Bytes, block_number: u64) -> Self {
        Self {
            address,
            topics,
            data,
            block_number,
        }
    }
}

// =============================================================================
// EXECUTION RESULT
// =============================================================================

/// How a top-level call or create left the machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// Ran to STOP, RETURN or SUICIDE.
    Succeed,
    /// Terminated by REVERT: output carries the revert data, unused gas is
    /// preserved, state changes are rolled back.
    Revert,
    /// Terminated by an error; all remaining gas of the frame is consumed.
    Error(VmError),
}

impl ExitReason {
    /// True for a successful exit.
    #[must_use]
    pub fn is_succeed(&self) -> bool {
        matches!(self, Self::Succeed)
    }

    /// True for REVERT.
    #[must_use]
    pub fn is_revert(&self) -> bool {
        matches!(self, Self::Revert)
    }
}

/// Result of a top-level call or create.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    /// Why execution stopped.
    pub exit: ExitReason,
    /// Output bytes (return data, or revert data for `Revert`).
    pub output: Bytes,
    /// Gas left in the outermost frame.
    pub gas_left: u64,
    /// Accumulated refund counter, uncapped. Callers settle it with
    /// [`crate::evm::gas::refund_cap`].
    pub refund: u64,
    /// Address of the deployed contract, for creates that succeeded.
    pub address: Option<Address>,
}

impl ExecutionResult {
    /// True if the execution committed its effects.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit.is_succeed()
    }

    /// Gas consumed relative to the supplied limit.
    #[must_use]
    pub fn gas_used(&self, gas_limit: u64) -> u64 {
        gas_limit.saturating_sub(self.gas_left)
    }
}

// =============================================================================
// TESTS
// =============================================================================
