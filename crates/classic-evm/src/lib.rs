//! # Classic-EVM
//!
//! An interpreter for the Ethereum Classic Virtual Machine: a stack-based,
//! deterministic bytecode machine executing contract code against a keyed
//! account state, metering every step with gas.
//!
//! One interpreter serves every fork; per-fork behaviour enters only
//! through the gas schedule, the instruction table and a handful of
//! dynamic-cost predicates. State lives behind the [`ports::outbound::Host`]
//! trait: embedded callers hand the machine a [`adapters::JournaledState`],
//! out-of-process drivers feed data on demand through the
//! [`ports::inbound::VmContext`] stepping interface.
//!
//! ## Embedded usage
//!
//! ```
//! use classic_evm::prelude::*;
//!
//! let mut state = JournaledState::new();
//! state.seed_balance(Address::new([1u8; 20]), U256::from(1_000_000));
//!
//! let mut evm = Evm::new(&mut state, Env::default(), Fork::Atlantis);
//! let result = evm.call(
//!     Address::new([1u8; 20]),
//!     Address::new([2u8; 20]),
//!     Bytes::new(),
//!     100_000,
//!     U256::zero(),
//! );
//! assert!(result.is_success());
//! ```

// Crate-level lints
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// =============================================================================
// MODULES
// =============================================================================

pub mod adapters;
pub mod domain;
pub mod errors;
pub mod evm;
pub mod ports;

// =============================================================================
// PRELUDE
// =============================================================================

/// Convenient re-exports for common usage.
pub mod prelude {
    // Value objects
    pub use crate::domain::value_objects::{
        Address, Bytes, Hash, StorageKey, StorageValue, U256,
    };

    // Entities
    pub use crate::domain::entities::{
        AccountState, BlockContext, Env, ExecutionResult, ExitReason, Log,
    };

    // Domain services
    pub use crate::domain::services::{create2_address, create_address, keccak256};

    // Errors
    pub use crate::errors::{PrecompileError, Require, VmError};

    // EVM components
    pub use crate::evm::forks::{Fork, ForkConfig, GasSchedule};
    pub use crate::evm::{Evm, CALL_DEPTH_LIMIT};

    // Ports and adapters
    pub use crate::adapters::{ChangedAccount, JournaledState, StepState};
    pub use crate::ports::inbound::{Status, VmContext};
    pub use crate::ports::outbound::Host;
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// TESTS
// =============================================================================
