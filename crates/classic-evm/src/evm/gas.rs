//! # Gas Metering
//!
//! Base-cost tiers, the dynamic fee rules, and the pre-step calculator
//! that prices an instruction before it executes. The calculator also
//! performs the one stack mutation the schedule demands: the gas argument
//! of a call-family opcode is rewritten to the amount actually forwarded.

use crate::domain::value_objects::{Address, StorageKey, StorageValue, U256};
use crate::errors::VmError;
use crate::evm::arithmetic;
use crate::evm::contract::Contract;
use crate::evm::forks::{ForkConfig, GasSchedule};
use crate::evm::instructions::Instruction;
use crate::evm::memory::{self, Memory};
use crate::evm::opcodes::Opcode;
use crate::evm::stack::Stack;
use crate::ports::outbound::Host;

// =============================================================================
// COST CONSTANTS
// =============================================================================

/// Fork-independent cost constants.
pub mod costs {
    /// Free.
    pub const ZERO: u64 = 0;
    /// Quick operations (ADDRESS, CALLER, POP, ...).
    pub const BASE: u64 = 2;
    /// Cheapest arithmetic (ADD, SUB, PUSH, DUP, SWAP, ...).
    pub const VERY_LOW: u64 = 3;
    /// MUL, DIV and friends.
    pub const LOW: u64 = 5;
    /// ADDMOD, MULMOD, JUMP.
    pub const MID: u64 = 8;
    /// JUMPI.
    pub const HIGH: u64 = 10;
    /// External account access (BLOCKHASH, pre-reprice EXT* ops).
    pub const EXT: u64 = 20;
    /// JUMPDEST marker.
    pub const JUMPDEST: u64 = 1;

    /// EXP base.
    pub const EXP: u64 = 10;
    /// SHA3 base.
    pub const SHA3: u64 = 30;
    /// SHA3 per hashed word; also prices CREATE2 init-code hashing.
    pub const SHA3_WORD: u64 = 6;
    /// Per-word fee of the copy family.
    pub const COPY: u64 = 3;
    /// LOG base and per-topic fee.
    pub const LOG: u64 = 375;
    /// LOG per data byte.
    pub const LOG_DATA: u64 = 8;

    /// SSTORE zero -> non-zero.
    pub const SSTORE_SET: u64 = 20_000;
    /// Every other SSTORE.
    pub const SSTORE_RESET: u64 = 5_000;
    /// Refund for clearing a slot.
    pub const SSTORE_REFUND: u64 = 15_000;

    /// Net-metered SSTORE no-op case.
    pub const NET_SSTORE_NOOP: u64 = 200;
    /// Net-metered refund when a dirty slot returns to its original zero.
    pub const NET_SSTORE_RESET_CLEAR_REFUND: u64 = 19_800;
    /// Net-metered refund when a dirty slot returns to its original value.
    pub const NET_SSTORE_RESET_REFUND: u64 = 4_800;

    /// CREATE base.
    pub const CREATE: u64 = 32_000;
    /// Deposit fee per byte of deployed code.
    pub const CREATE_DATA: u64 = 200;
    /// Surcharge for a CALL that transfers value.
    pub const CALL_VALUE: u64 = 9_000;
    /// Surcharge for a CALL that brings an account into existence.
    pub const CALL_NEW_ACCOUNT: u64 = 25_000;
    /// Free gas handed to the callee of a value transfer.
    pub const CALL_STIPEND: u64 = 2_300;
    /// Refund for a first-time SELFDESTRUCT.
    pub const SUICIDE_REFUND: u64 = 24_000;

    /// Largest deployed contract under the Atlantis rules.
    pub const MAX_CODE_SIZE: usize = 24_576;
}

// =============================================================================
// SMALL CALCULATORS
// =============================================================================

/// SHA3 fee: base plus per-word component.
#[must_use]
pub fn sha3_gas(len: u64) -> u64 {
    costs::SHA3 + costs::SHA3_WORD * len.div_ceil(32)
}

/// Copy-family fee for `len` copied bytes (words are rounded up).
#[must_use]
pub fn copy_gas(len: u64) -> u64 {
    costs::COPY * len.div_ceil(32)
}

/// LOGn fee.
#[must_use]
pub fn log_gas(topics: usize, len: u64) -> u64 {
    costs::LOG + costs::LOG * topics as u64 + costs::LOG_DATA * len
}

/// EXP dynamic fee, per significant exponent byte.
#[must_use]
pub fn exp_gas(schedule: &GasSchedule, exponent: U256) -> u64 {
    schedule.exp_byte * arithmetic::byte_len(exponent)
}

/// Gas actually forwarded to a callee requesting `requested`, out of
/// `available` (the frame's gas after the call's own cost). Under EIP-150
/// rules at most 63/64 of the remainder leaves the frame; before that the
/// request is taken literally.
#[must_use]
pub fn forwarded_call_gas(schedule: &GasSchedule, available: u64, requested: U256) -> u64 {
    if schedule.forwards_sixty_fourths() {
        let cap = available - available / 64;
        if requested > U256::from(cap) {
            cap
        } else {
            requested.as_u64()
        }
    } else if requested > U256::from(u64::MAX) {
        u64::MAX
    } else {
        requested.as_u64()
    }
}

/// Refund granted at transaction settlement: capped at half the gas used.
#[must_use]
pub fn refund_cap(gas_used: u64, refund: u64) -> u64 {
    refund.min(gas_used / 2)
}

// =============================================================================
// SSTORE
// =============================================================================

/// Prices an SSTORE and books its refund movement. The classic three-regime
/// rule by default; the net-metered (EIP-1283) table when the fork config
/// selects it.
fn sstore_cost<H: Host + ?Sized>(
    config: &ForkConfig,
    host: &mut H,
    address: Address,
    key: StorageKey,
    new: StorageValue,
) -> Result<u64, VmError> {
    let current = host.get_storage(address, key)?;

    if config.eip1283 {
        return net_sstore_cost(host, address, key, current, new);
    }

    let gas = if current.is_zero() && !new.is_zero() {
        costs::SSTORE_SET
    } else if !current.is_zero() && new.is_zero() {
        host.add_refund(costs::SSTORE_REFUND);
        costs::SSTORE_RESET
    } else {
        costs::SSTORE_RESET
    };
    Ok(gas)
}

/// EIP-1283 case table over (original, current, new).
fn net_sstore_cost<H: Host + ?Sized>(
    host: &mut H,
    address: Address,
    key: StorageKey,
    current: StorageValue,
    new: StorageValue,
) -> Result<u64, VmError> {
    if current == new {
        return Ok(costs::NET_SSTORE_NOOP);
    }

    let original = host.get_original_storage(address, key)?;
    if original == current {
        if original.is_zero() {
            return Ok(costs::SSTORE_SET);
        }
        if new.is_zero() {
            host.add_refund(costs::SSTORE_REFUND);
        }
        return Ok(costs::SSTORE_RESET);
    }

    // Dirty slot: charge the no-op fee and move refunds around.
    if !original.is_zero() {
        if current.is_zero() {
            host.sub_refund(costs::SSTORE_REFUND);
        } else if new.is_zero() {
            host.add_refund(costs::SSTORE_REFUND);
        }
    }
    if original == new {
        if original.is_zero() {
            host.add_refund(costs::NET_SSTORE_RESET_CLEAR_REFUND);
        } else {
            host.add_refund(costs::NET_SSTORE_RESET_REFUND);
        }
    }
    Ok(costs::NET_SSTORE_NOOP)
}

// =============================================================================
// PRE-STEP CALCULATOR
// =============================================================================

/// What the pre-pass quotes for one instruction.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StepCost {
    /// Total gas to charge, base cost included.
    pub gas: u64,
    /// Memory size the frame must grow to before executing, if the
    /// instruction touches memory.
    pub memory_size: Option<usize>,
}

/// Largest end offset a memory access may name before it is priced as
/// unpayable outright.
const MEMORY_HARD_BOUND: u64 = 1 << 40;

/// End offset of a memory access, or None for zero-length accesses, which
/// never expand memory.
fn mem_span(offset: U256, len: U256) -> Result<Option<usize>, VmError> {
    if len.is_zero() {
        return Ok(None);
    }
    if offset > U256::from(MEMORY_HARD_BOUND) || len > U256::from(MEMORY_HARD_BOUND) {
        return Err(VmError::OutOfGas);
    }
    let end = offset.as_u64() + len.as_u64();
    if end > MEMORY_HARD_BOUND {
        return Err(VmError::OutOfGas);
    }
    Ok(Some(end as usize))
}

/// Larger of two optional memory extents.
fn max_span(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}

/// Bounded conversion for copy lengths; anything that cannot be paid for
/// is reported as out of gas up front.
fn copy_len(len: U256) -> Result<u64, VmError> {
    if len > U256::from(MEMORY_HARD_BOUND) {
        return Err(VmError::OutOfGas);
    }
    Ok(len.as_u64())
}

/// Computes the full gas bill for the instruction at the current step:
/// base cost, memory expansion, op-specific dynamic fees, and the
/// call-gas rewrite for the call family.
pub(crate) fn step_cost<H: Host + ?Sized>(
    config: &ForkConfig,
    host: &mut H,
    contract: &Contract,
    stack: &mut Stack,
    memory: &Memory,
    op: Opcode,
    instr: &Instruction,
) -> Result<StepCost, VmError> {
    let schedule = &config.schedule;
    let mut gas = instr.base_gas;
    let mut mem: Option<usize> = None;

    match op {
        Opcode::Exp => {
            gas += exp_gas(schedule, stack.peek(1)?);
        }

        Opcode::Sha3 => {
            mem = mem_span(stack.peek(0)?, stack.peek(1)?)?;
            gas = gas.saturating_add(costs::SHA3_WORD * copy_len(stack.peek(1)?)?.div_ceil(32));
        }

        Opcode::CallDataCopy | Opcode::CodeCopy | Opcode::ReturnDataCopy => {
            mem = mem_span(stack.peek(0)?, stack.peek(2)?)?;
            gas = gas.saturating_add(copy_gas(copy_len(stack.peek(2)?)?));
        }

        Opcode::ExtCodeCopy => {
            mem = mem_span(stack.peek(1)?, stack.peek(3)?)?;
            gas = gas.saturating_add(copy_gas(copy_len(stack.peek(3)?)?));
        }

        Opcode::MLoad | Opcode::MStore => {
            mem = mem_span(stack.peek(0)?, U256::from(32))?;
        }

        Opcode::MStore8 => {
            mem = mem_span(stack.peek(0)?, U256::one())?;
        }

        Opcode::SStore => {
            let key = StorageKey::from_u256(stack.peek(0)?);
            let new = StorageValue::from_u256(stack.peek(1)?);
            gas += sstore_cost(config, host, contract.address, key, new)?;
        }

        Opcode::Log0 | Opcode::Log1 | Opcode::Log2 | Opcode::Log3 | Opcode::Log4 => {
            let topics = op.log_topics().unwrap_or(0);
            let len = copy_len(stack.peek(1)?)?;
            mem = mem_span(stack.peek(0)?, stack.peek(1)?)?;
            // The table already carries the 375 base; add topics and data.
            gas = gas.saturating_add(costs::LOG * topics as u64 + costs::LOG_DATA * len);
        }

        Opcode::Return | Opcode::Revert => {
            mem = mem_span(stack.peek(0)?, stack.peek(1)?)?;
        }

        Opcode::Create => {
            mem = mem_span(stack.peek(1)?, stack.peek(2)?)?;
        }

        Opcode::Create2 => {
            mem = mem_span(stack.peek(1)?, stack.peek(2)?)?;
            gas = gas.saturating_add(costs::SHA3_WORD * copy_len(stack.peek(2)?)?.div_ceil(32));
        }

        Opcode::Call | Opcode::CallCode => {
            let value = stack.peek(2)?;
            mem = max_span(
                mem_span(stack.peek(3)?, stack.peek(4)?)?,
                mem_span(stack.peek(5)?, stack.peek(6)?)?,
            );
            if !value.is_zero() {
                gas += costs::CALL_VALUE;
            }
            if op == Opcode::Call {
                // Pre-Atlantis the surcharge hits any call that brings the
                // target into existence; Atlantis narrows it to value
                // transfers into empty accounts.
                let target = Address::from_word(stack.peek(1)?);
                let creates = if config.atlantis {
                    !value.is_zero() && host.empty(target)?
                } else {
                    !host.exists(target)?
                };
                if creates {
                    gas += costs::CALL_NEW_ACCOUNT;
                }
            }
            return call_quote(schedule, contract, stack, memory, mem, gas);
        }

        Opcode::DelegateCall | Opcode::StaticCall => {
            mem = max_span(
                mem_span(stack.peek(2)?, stack.peek(3)?)?,
                mem_span(stack.peek(4)?, stack.peek(5)?)?,
            );
            return call_quote(schedule, contract, stack, memory, mem, gas);
        }

        Opcode::Suicide => {
            if let Some(surcharge) = schedule.create_by_suicide {
                let beneficiary = Address::from_word(stack.peek(0)?);
                let creates = if config.atlantis {
                    host.empty(beneficiary)? && !host.get_balance(contract.address)?.is_zero()
                } else {
                    !host.exists(beneficiary)?
                };
                if creates {
                    gas += surcharge;
                }
            }
        }

        _ => {}
    }

    // Memory expansion is always quoted as part of the same bill.
    if let Some(size) = mem {
        let fee = memory::expansion_gas(memory.word_size(), memory::to_word_size(size));
        gas = gas.saturating_add(fee);
    }

    Ok(StepCost {
        gas,
        memory_size: mem,
    })
}

/// Finishes a call-family quote: folds the memory fee into the bill,
/// computes the forwarded amount from what would remain after it, charges
/// the forwarded gas as part of the bill, and rewrites the stack's gas
/// argument so the handler sees the forwarded value.
fn call_quote(
    schedule: &GasSchedule,
    contract: &Contract,
    stack: &mut Stack,
    memory: &Memory,
    mem: Option<usize>,
    mut gas: u64,
) -> Result<StepCost, VmError> {
    if let Some(size) = mem {
        let fee = memory::expansion_gas(memory.word_size(), memory::to_word_size(size));
        gas = gas.saturating_add(fee);
    }

    let Some(available) = contract.gas.checked_sub(gas) else {
        // The base bill alone is unpayable; charging will fault.
        return Err(VmError::OutOfGas);
    };

    let forwarded = forwarded_call_gas(schedule, available, stack.peek(0)?);
    stack.set(0, U256::from(forwarded))?;

    Ok(StepCost {
        gas: gas.saturating_add(forwarded),
        memory_size: mem,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::forks::Fork;

    #[test]
    fn test_sha3_gas() {
        assert_eq!(sha3_gas(0), 30);
        assert_eq!(sha3_gas(32), 36);
        assert_eq!(sha3_gas(33), 42);
    }

    #[test]
    fn test_copy_gas_rounds_up() {
        assert_eq!(copy_gas(0), 0);
        assert_eq!(copy_gas(1), 3);
        assert_eq!(copy_gas(32), 3);
        assert_eq!(copy_gas(64), 6);
    }

    #[test]
    fn test_log_gas() {
        assert_eq!(log_gas(0, 0), 375);
        assert_eq!(log_gas(2, 10), 375 + 750 + 80);
    }

    #[test]
    fn test_exp_gas_per_fork() {
        let old = GasSchedule::for_fork(Fork::Homestead);
        let new = GasSchedule::for_fork(Fork::Eip150);
        assert_eq!(exp_gas(&old, U256::from(0xFFFF)), 20);
        assert_eq!(exp_gas(&new, U256::from(0xFFFF)), 100);
        assert_eq!(exp_gas(&new, U256::zero()), 0);
    }

    #[test]
    fn test_forwarding_63_64() {
        let eip150 = GasSchedule::for_fork(Fork::Eip150);
        // 6400 available: at most 6300 leaves the frame.
        assert_eq!(forwarded_call_gas(&eip150, 6400, U256::MAX), 6300);
        assert_eq!(forwarded_call_gas(&eip150, 6400, U256::from(100)), 100);

        let frontier = GasSchedule::for_fork(Fork::Frontier);
        assert_eq!(
            forwarded_call_gas(&frontier, 6400, U256::from(1_000_000)),
            1_000_000
        );
    }

    #[test]
    fn test_refund_cap() {
        assert_eq!(refund_cap(1000, 600), 500);
        assert_eq!(refund_cap(1000, 400), 400);
        assert_eq!(refund_cap(0, 100), 0);
    }

    #[test]
    fn test_mem_span() {
        assert_eq!(mem_span(U256::from(100), U256::zero()).unwrap(), None);
        assert_eq!(
            mem_span(U256::from(32), U256::from(32)).unwrap(),
            Some(64)
        );
        assert_eq!(mem_span(U256::MAX, U256::one()), Err(VmError::OutOfGas));
        assert_eq!(mem_span(U256::one(), U256::MAX), Err(VmError::OutOfGas));
    }

    #[test]
    fn test_max_span() {
        assert_eq!(max_span(Some(3), Some(7)), Some(7));
        assert_eq!(max_span(Some(3), None), Some(3));
        assert_eq!(max_span(None, None), None);
    }
}
