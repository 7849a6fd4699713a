//! # EVM Core
//!
//! The machine itself: word arithmetic, stack, memory, jump analysis, the
//! fork-parameterised gas and instruction tables, the precompile registry,
//! and the interpreter with its call/create orchestration.

pub mod arithmetic;
pub mod contract;
pub mod forks;
pub mod gas;
pub mod instructions;
pub mod interpreter;
pub mod jumpdest;
pub mod memory;
pub mod opcodes;
pub mod precompiles;
pub mod stack;

pub use interpreter::{Evm, CALL_DEPTH_LIMIT};
