//! # Interpreter
//!
//! The frame loop and the call/create orchestration. One `Evm` is built
//! per execution from (host, environment, fork); nested calls run as
//! recursive frames over the same host, each guarded by a state snapshot.

use crate::domain::entities::{Env, ExecutionResult, ExitReason, Log};
use crate::domain::services::{create2_address, create_address, keccak256};
use crate::domain::value_objects::{Address, Bytes, Hash, StorageKey, StorageValue, U256};
use crate::errors::VmError;
use crate::evm::arithmetic;
use crate::evm::contract::Contract;
use crate::evm::forks::{Fork, ForkConfig};
use crate::evm::gas::{self, costs};
use crate::evm::instructions::InstructionSet;
use crate::evm::jumpdest::JumpDestCache;
use crate::evm::memory::Memory;
use crate::evm::opcodes::Opcode;
use crate::evm::precompiles;
use crate::evm::stack::{Stack, STACK_LIMIT};
use crate::ports::outbound::Host;
use std::sync::Arc;
use tracing::{debug, trace};

/// Maximum call/create nesting depth.
pub const CALL_DEPTH_LIMIT: usize = 1024;

// =============================================================================
// INTERNAL FRAME TYPES
// =============================================================================

/// Which call-family opcode opened a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CallKind {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
}

/// Parameters of one message call.
#[derive(Clone, Debug)]
struct CallParams {
    kind: CallKind,
    caller: Address,
    /// Context (storage) address of the callee frame.
    address: Address,
    /// Where the code is loaded from.
    code_address: Address,
    /// Apparent value (CALLVALUE).
    value: U256,
    /// Actual balance movement; None for DELEGATECALL and STATICCALL.
    transfer: Option<U256>,
    input: Bytes,
    gas: u64,
    read_only: bool,
}

/// How a finished frame looks to its parent.
#[derive(Clone, Debug)]
enum FrameOutcome {
    /// Effects committed, unused gas returned.
    Success { output: Bytes, gas_left: u64 },
    /// Effects rolled back, output and unused gas preserved.
    Revert { output: Bytes, gas_left: u64 },
    /// Effects rolled back; `gas_left` is zero unless the frame never ran.
    Fail { error: VmError, gas_left: u64 },
}

impl FrameOutcome {
    fn gas_left(&self) -> u64 {
        match self {
            Self::Success { gas_left, .. }
            | Self::Revert { gas_left, .. }
            | Self::Fail { gas_left, .. } => *gas_left,
        }
    }

    fn output(&self) -> Bytes {
        match self {
            Self::Success { output, .. } | Self::Revert { output, .. } => output.clone(),
            Self::Fail { .. } => Bytes::new(),
        }
    }

    fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// A create outcome additionally carries the deployed address.
#[derive(Clone, Debug)]
struct CreateOutcome {
    outcome: FrameOutcome,
    address: Option<Address>,
}

/// End of a frame that ran to a halting or reverting instruction.
struct FrameExit {
    output: Bytes,
    gas_left: u64,
    reverted: bool,
}

// =============================================================================
// EVM
// =============================================================================

/// The virtual machine: interpreter plus call/create orchestration, bound
/// to a host for the duration of one execution.
pub struct Evm<'h, H: Host + ?Sized> {
    host: &'h mut H,
    env: Env,
    config: ForkConfig,
    instructions: InstructionSet,
    jumpdests: JumpDestCache,
    depth: usize,
}

impl<'h, H: Host + ?Sized> Evm<'h, H> {
    /// Builds a machine for `fork` with its derived rule set.
    pub fn new(host: &'h mut H, env: Env, fork: Fork) -> Self {
        Self::with_config(host, env, ForkConfig::new(fork))
    }

    /// Builds a machine from an explicit configuration; this is how hosts
    /// opt into optional rules such as net-metered SSTORE.
    pub fn with_config(host: &'h mut H, env: Env, config: ForkConfig) -> Self {
        let instructions = InstructionSet::for_fork(&config);
        Self {
            host,
            env,
            config,
            instructions,
            jumpdests: JumpDestCache::new(),
            depth: 0,
        }
    }

    /// The active fork configuration.
    #[must_use]
    pub fn config(&self) -> &ForkConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Top-level entry points
    // -------------------------------------------------------------------------

    /// Runs a top-level message call.
    pub fn call(
        &mut self,
        caller: Address,
        to: Address,
        data: Bytes,
        gas: u64,
        value: U256,
    ) -> ExecutionResult {
        debug!(?caller, ?to, gas, "executing call");
        let params = CallParams {
            kind: CallKind::Call,
            caller,
            address: to,
            code_address: to,
            value,
            transfer: Some(value),
            input: data,
            gas,
            read_only: false,
        };
        match self.execute_call(params) {
            Ok(outcome) => self.seal(outcome, None),
            Err(err) => Self::suspended(err),
        }
    }

    /// Runs a top-level contract creation.
    pub fn create(
        &mut self,
        caller: Address,
        init: Bytes,
        gas: u64,
        value: U256,
    ) -> ExecutionResult {
        debug!(?caller, gas, code_len = init.len(), "executing create");
        match self.execute_create(caller, value, init, gas, None, false) {
            Ok(CreateOutcome { outcome, address }) => self.seal(outcome, address),
            Err(err) => Self::suspended(err),
        }
    }

    /// Folds a frame outcome into the driver-visible result.
    fn seal(&mut self, outcome: FrameOutcome, address: Option<Address>) -> ExecutionResult {
        let refund = self.host.get_refund();
        match outcome {
            FrameOutcome::Success { output, gas_left } => ExecutionResult {
                exit: ExitReason::Succeed,
                output,
                gas_left,
                refund,
                address,
            },
            FrameOutcome::Revert { output, gas_left } => ExecutionResult {
                exit: ExitReason::Revert,
                output,
                gas_left,
                refund,
                address: None,
            },
            FrameOutcome::Fail { error, gas_left } => ExecutionResult {
                exit: ExitReason::Error(error),
                output: Bytes::new(),
                gas_left,
                refund,
                address: None,
            },
        }
    }

    /// Result shape for an execution paused on missing host data.
    fn suspended(err: VmError) -> ExecutionResult {
        ExecutionResult {
            exit: ExitReason::Error(err),
            output: Bytes::new(),
            gas_left: 0,
            refund: 0,
            address: None,
        }
    }

    // -------------------------------------------------------------------------
    // Call orchestration
    // -------------------------------------------------------------------------

    /// Opens a call frame: snapshot, transfer, run, commit or roll back.
    /// `Err` is reserved for step-mode suspension and bubbles through
    /// every nesting level.
    fn execute_call(&mut self, params: CallParams) -> Result<FrameOutcome, VmError> {
        trace!(
            kind = ?params.kind,
            to = ?params.code_address,
            gas = params.gas,
            depth = self.depth,
            "opening call frame"
        );
        if self.depth >= CALL_DEPTH_LIMIT {
            return Ok(FrameOutcome::Fail {
                error: VmError::CallDepthExceeded,
                gas_left: params.gas,
            });
        }

        let snapshot = self.host.snapshot();

        if let Some(amount) = params.transfer {
            if !self.host.can_transfer(params.caller, amount)? {
                let available = self.host.get_balance(params.caller)?;
                self.host.revert_to_snapshot(snapshot);
                return Ok(FrameOutcome::Fail {
                    error: VmError::TransferFailed {
                        required: amount,
                        available,
                    },
                    gas_left: params.gas,
                });
            }
            self.host.transfer(params.caller, params.address, amount)?;
        }

        if let Some(precompile) = precompiles::for_address(params.code_address, &self.config) {
            trace!(address = ?params.code_address, "running precompile");
            return match precompile.execute(params.input.as_slice(), params.gas) {
                Ok(out) => Ok(FrameOutcome::Success {
                    gas_left: params.gas - out.gas_used,
                    output: out.output,
                }),
                Err(err) => {
                    self.host.revert_to_snapshot(snapshot);
                    Ok(FrameOutcome::Fail {
                        error: err.into(),
                        gas_left: 0,
                    })
                }
            };
        }

        let code = self.host.get_code(params.code_address)?;
        let code_hash = self.host.get_code_hash(params.code_address)?;
        let contract = Contract::new(
            params.caller,
            params.address,
            params.code_address,
            code_hash,
            Arc::new(code.into_vec()),
            params.input,
            params.value,
            params.gas,
        );

        self.depth += 1;
        let result = self.run_frame(contract, params.read_only);
        self.depth -= 1;

        match result {
            Ok(exit) if !exit.reverted => Ok(FrameOutcome::Success {
                output: exit.output,
                gas_left: exit.gas_left,
            }),
            Ok(exit) => {
                self.host.revert_to_snapshot(snapshot);
                Ok(FrameOutcome::Revert {
                    output: exit.output,
                    gas_left: exit.gas_left,
                })
            }
            Err(err) if err.is_require() => Err(err),
            Err(err) => {
                debug!(depth = self.depth, %err, "frame failed");
                self.host.revert_to_snapshot(snapshot);
                Ok(FrameOutcome::Fail {
                    error: err,
                    gas_left: 0,
                })
            }
        }
    }

    // -------------------------------------------------------------------------
    // Create orchestration
    // -------------------------------------------------------------------------

    /// Opens a create frame and, on success, deposits the produced code.
    fn execute_create(
        &mut self,
        caller: Address,
        value: U256,
        init: Bytes,
        gas: u64,
        salt: Option<Hash>,
        read_only: bool,
    ) -> Result<CreateOutcome, VmError> {
        if self.depth >= CALL_DEPTH_LIMIT {
            return Ok(CreateOutcome {
                outcome: FrameOutcome::Fail {
                    error: VmError::CallDepthExceeded,
                    gas_left: gas,
                },
                address: None,
            });
        }
        if !self.host.can_transfer(caller, value)? {
            let available = self.host.get_balance(caller)?;
            return Ok(CreateOutcome {
                outcome: FrameOutcome::Fail {
                    error: VmError::TransferFailed {
                        required: value,
                        available,
                    },
                    gas_left: gas,
                },
                address: None,
            });
        }

        let nonce = self.host.get_nonce(caller)?;
        let address = match salt {
            None => create_address(caller, nonce),
            Some(salt) => create2_address(caller, salt, init.as_slice()),
        };
        debug!(?caller, ?address, gas, "creating contract");

        let snapshot = self.host.snapshot();
        self.host.set_nonce(caller, nonce + 1)?;
        self.host.create_account(address)?;
        self.host.transfer(caller, address, value)?;

        let code_hash = keccak256(init.as_slice());
        let contract = Contract::new(
            caller,
            address,
            address,
            code_hash,
            Arc::new(init.into_vec()),
            Bytes::new(),
            value,
            gas,
        );

        self.depth += 1;
        let result = self.run_frame(contract, read_only);
        self.depth -= 1;

        let exit = match result {
            Ok(exit) => exit,
            Err(err) if err.is_require() => return Err(err),
            Err(err) => {
                self.host.revert_to_snapshot(snapshot);
                return Ok(CreateOutcome {
                    outcome: FrameOutcome::Fail {
                        error: err,
                        gas_left: 0,
                    },
                    address: None,
                });
            }
        };

        if exit.reverted {
            self.host.revert_to_snapshot(snapshot);
            return Ok(CreateOutcome {
                outcome: FrameOutcome::Revert {
                    output: exit.output,
                    gas_left: exit.gas_left,
                },
                address: None,
            });
        }

        // Deposit the deployed code at 200 gas per byte.
        let code = exit.output;
        let mut gas_left = exit.gas_left;
        let oversized = self.config.atlantis && code.len() > costs::MAX_CODE_SIZE;
        let deposit = costs::CREATE_DATA * code.len() as u64;

        if !oversized && gas_left >= deposit {
            gas_left -= deposit;
            self.host.set_code(address, code)?;
        } else if self.config.homestead || oversized {
            // Fatal from Homestead onward: roll back and burn the frame.
            self.host.revert_to_snapshot(snapshot);
            return Ok(CreateOutcome {
                outcome: FrameOutcome::Fail {
                    error: VmError::CodeStoreOutOfGas,
                    gas_left: 0,
                },
                address: None,
            });
        }
        // Frontier tolerates the failed deposit: the account keeps empty code.

        Ok(CreateOutcome {
            outcome: FrameOutcome::Success {
                output: Bytes::new(),
                gas_left,
            },
            address: Some(address),
        })
    }

    // -------------------------------------------------------------------------
    // Frame loop
    // -------------------------------------------------------------------------

    /// Steps one frame to completion.
    fn run_frame(&mut self, mut contract: Contract, read_only: bool) -> Result<FrameExit, VmError> {
        let mut stack = Stack::new();
        let mut memory = Memory::new();
        let mut return_data = Bytes::new();
        let mut pc: usize = 0;

        loop {
            let op_byte = contract.op(pc);
            let instr = *self.instructions.get(op_byte);
            if !instr.valid {
                return Err(VmError::InvalidOpcode(op_byte));
            }
            let Some(op) = Opcode::from_byte(op_byte) else {
                return Err(VmError::InvalidOpcode(op_byte));
            };

            // Stack discipline before anything is charged.
            stack.require(instr.pops)?;
            if stack.len() - instr.pops + instr.pushes > STACK_LIMIT {
                return Err(VmError::StackOverflow);
            }

            // Quote the step, charge it, then grow memory to the quoted size.
            let config = self.config;
            let quote = gas::step_cost(
                &config,
                &mut *self.host,
                &contract,
                &mut stack,
                &memory,
                op,
                &instr,
            )?;
            trace!(pc, op = instr.name, cost = quote.gas, gas = contract.gas, "step");
            if !contract.use_gas(quote.gas) {
                return Err(VmError::OutOfGas);
            }
            if let Some(size) = quote.memory_size {
                memory.resize(size);
            }

            // Static frames may not write state or send value.
            if read_only && self.config.atlantis {
                let value_call = op == Opcode::Call && !stack.peek(2)?.is_zero();
                if instr.writes || value_call {
                    return Err(VmError::WriteProtection);
                }
            }

            let ret = self.execute(
                op,
                &mut contract,
                &mut stack,
                &mut memory,
                &return_data,
                &mut pc,
                read_only,
            )?;

            if instr.returns_data {
                if let Some(bytes) = &ret {
                    return_data = Bytes::from_slice(bytes);
                }
            }
            if instr.reverts {
                return Ok(FrameExit {
                    output: Bytes::from_vec(ret.unwrap_or_default()),
                    gas_left: contract.gas,
                    reverted: true,
                });
            }
            if instr.halts {
                return Ok(FrameExit {
                    output: Bytes::from_vec(ret.unwrap_or_default()),
                    gas_left: contract.gas,
                    reverted: false,
                });
            }
            if !instr.jumps {
                pc += 1;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Opcode semantics
    // -------------------------------------------------------------------------

    /// Executes one instruction. Returns the bytes the operation produced,
    /// if any; the loop routes them to the return buffer and frame exit.
    #[allow(clippy::too_many_lines)]
    fn execute(
        &mut self,
        op: Opcode,
        contract: &mut Contract,
        stack: &mut Stack,
        memory: &mut Memory,
        return_data: &Bytes,
        pc: &mut usize,
        read_only: bool,
    ) -> Result<Option<Vec<u8>>, VmError> {
        match op {
            // =============================================================
            // STOP & ARITHMETIC
            // =============================================================
            Opcode::Stop => {}

            Opcode::Add => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                stack.push(a.overflowing_add(b).0)?;
            }

            Opcode::Mul => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                stack.push(a.overflowing_mul(b).0)?;
            }

            Opcode::Sub => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                stack.push(a.overflowing_sub(b).0)?;
            }

            Opcode::Div => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                stack.push(if b.is_zero() { U256::zero() } else { a / b })?;
            }

            Opcode::SDiv => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                stack.push(arithmetic::signed_div(a, b))?;
            }

            Opcode::Mod => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                stack.push(if b.is_zero() { U256::zero() } else { a % b })?;
            }

            Opcode::SMod => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                stack.push(arithmetic::signed_mod(a, b))?;
            }

            Opcode::AddMod => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                let n = stack.pop()?;
                stack.push(arithmetic::add_mod(a, b, n))?;
            }

            Opcode::MulMod => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                let n = stack.pop()?;
                stack.push(arithmetic::mul_mod(a, b, n))?;
            }

            Opcode::Exp => {
                let base = stack.pop()?;
                let exponent = stack.pop()?;
                stack.push(arithmetic::exp(base, exponent))?;
            }

            Opcode::SignExtend => {
                let k = stack.pop()?;
                let x = stack.pop()?;
                stack.push(arithmetic::sign_extend(k, x))?;
            }

            // =============================================================
            // COMPARISON & BITWISE
            // =============================================================
            Opcode::Lt => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                stack.push(bool_word(a < b))?;
            }

            Opcode::Gt => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                stack.push(bool_word(a > b))?;
            }

            Opcode::SLt => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                stack.push(bool_word(arithmetic::signed_lt(a, b)))?;
            }

            Opcode::SGt => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                stack.push(bool_word(arithmetic::signed_lt(b, a)))?;
            }

            Opcode::Eq => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                stack.push(bool_word(a == b))?;
            }

            Opcode::IsZero => {
                let a = stack.pop()?;
                stack.push(bool_word(a.is_zero()))?;
            }

            Opcode::And => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                stack.push(a & b)?;
            }

            Opcode::Or => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                stack.push(a | b)?;
            }

            Opcode::Xor => {
                let a = stack.pop()?;
                let b = stack.pop()?;
                stack.push(a ^ b)?;
            }

            Opcode::Not => {
                let a = stack.pop()?;
                stack.push(!a)?;
            }

            Opcode::Byte => {
                let i = stack.pop()?;
                let x = stack.pop()?;
                stack.push(arithmetic::byte(i, x))?;
            }

            Opcode::Shl => {
                let shift = stack.pop()?;
                let value = stack.pop()?;
                stack.push(arithmetic::shl(shift, value))?;
            }

            Opcode::Shr => {
                let shift = stack.pop()?;
                let value = stack.pop()?;
                stack.push(arithmetic::shr(shift, value))?;
            }

            Opcode::Sar => {
                let shift = stack.pop()?;
                let value = stack.pop()?;
                stack.push(arithmetic::sar(shift, value))?;
            }

            // =============================================================
            // SHA3
            // =============================================================
            Opcode::Sha3 => {
                let offset = stack.pop()?;
                let len = stack.pop()?;
                let data = read_memory(memory, offset, len);
                stack.push(keccak256(&data).to_word())?;
            }

            // =============================================================
            // ENVIRONMENT
            // =============================================================
            Opcode::Address => stack.push(contract.address.to_word())?,
            Opcode::Caller => stack.push(contract.caller.to_word())?,
            Opcode::Origin => stack.push(self.env.origin.to_word())?,
            Opcode::CallValue => stack.push(contract.value)?,
            Opcode::GasPrice => stack.push(self.env.gas_price)?,

            Opcode::Balance => {
                let address = Address::from_word(stack.pop()?);
                let balance = self.host.get_balance(address)?;
                stack.push(balance)?;
            }

            Opcode::CallDataLoad => {
                let offset = stack.pop()?;
                let word = copy_padded(contract.input.as_slice(), offset, 32);
                stack.push(U256::from_big_endian(&word))?;
            }

            Opcode::CallDataSize => stack.push(U256::from(contract.input.len()))?,

            Opcode::CallDataCopy => {
                let dest = stack.pop()?;
                let offset = stack.pop()?;
                let len = stack.pop()?;
                copy_to_memory(memory, dest, contract.input.as_slice(), offset, len);
            }

            Opcode::CodeSize => stack.push(U256::from(contract.code.len()))?,

            Opcode::CodeCopy => {
                let dest = stack.pop()?;
                let offset = stack.pop()?;
                let len = stack.pop()?;
                copy_to_memory(memory, dest, &contract.code, offset, len);
            }

            Opcode::ExtCodeSize => {
                let address = Address::from_word(stack.pop()?);
                let size = self.host.get_code_size(address)?;
                stack.push(U256::from(size))?;
            }

            Opcode::ExtCodeCopy => {
                let address = Address::from_word(stack.pop()?);
                let dest = stack.pop()?;
                let offset = stack.pop()?;
                let len = stack.pop()?;
                let code = self.host.get_code(address)?;
                copy_to_memory(memory, dest, code.as_slice(), offset, len);
            }

            Opcode::ExtCodeHash => {
                let address = Address::from_word(stack.pop()?);
                let word = if self.host.empty(address)? {
                    U256::zero()
                } else {
                    self.host.get_code_hash(address)?.to_word()
                };
                stack.push(word)?;
            }

            Opcode::ReturnDataSize => stack.push(U256::from(return_data.len()))?,

            Opcode::ReturnDataCopy => {
                let dest = stack.pop()?;
                let offset = stack.pop()?;
                let len = stack.pop()?;
                let end = offset.overflowing_add(len);
                if end.1 || end.0 > U256::from(return_data.len()) {
                    return Err(VmError::ReturnDataOutOfBounds {
                        offset: offset.low_u64() as usize,
                        size: len.low_u64() as usize,
                        available: return_data.len(),
                    });
                }
                copy_to_memory(memory, dest, return_data.as_slice(), offset, len);
            }

            // =============================================================
            // BLOCK
            // =============================================================
            Opcode::BlockHash => {
                let number = stack.pop()?;
                let current = self.env.block.number;
                let in_window = number < U256::from(current)
                    && number.overflowing_add(U256::from(256)).0 >= U256::from(current);
                let word = if in_window {
                    self.host.get_block_hash(number.as_u64())?.to_word()
                } else {
                    U256::zero()
                };
                stack.push(word)?;
            }

            Opcode::Coinbase => stack.push(self.env.block.coinbase.to_word())?,
            Opcode::Timestamp => stack.push(U256::from(self.env.block.timestamp))?,
            Opcode::Number => stack.push(U256::from(self.env.block.number))?,
            Opcode::Difficulty => stack.push(self.env.block.difficulty)?,
            Opcode::GasLimit => stack.push(U256::from(self.env.block.gas_limit))?,

            // =============================================================
            // STACK, MEMORY, STORAGE, FLOW
            // =============================================================
            Opcode::Pop => {
                stack.pop()?;
            }

            Opcode::MLoad => {
                let offset = stack.pop()?.as_usize();
                stack.push(U256::from_big_endian(&memory.get_word(offset)))?;
            }

            Opcode::MStore => {
                let offset = stack.pop()?.as_usize();
                let value = stack.pop()?;
                let mut word = [0u8; 32];
                value.to_big_endian(&mut word);
                memory.set(offset, &word);
            }

            Opcode::MStore8 => {
                let offset = stack.pop()?.as_usize();
                let value = stack.pop()?;
                memory.set_byte(offset, value.byte(0));
            }

            Opcode::SLoad => {
                let key = StorageKey::from_u256(stack.pop()?);
                let value = self.host.get_storage(contract.address, key)?;
                stack.push(value.to_u256())?;
            }

            Opcode::SStore => {
                let key = StorageKey::from_u256(stack.pop()?);
                let value = StorageValue::from_u256(stack.pop()?);
                self.host.set_storage(contract.address, key, value)?;
            }

            Opcode::Jump => {
                let dest = stack.pop()?;
                *pc = self.jump_target(contract, dest)?;
            }

            Opcode::JumpI => {
                let dest = stack.pop()?;
                let condition = stack.pop()?;
                if condition.is_zero() {
                    *pc += 1;
                } else {
                    *pc = self.jump_target(contract, dest)?;
                }
            }

            Opcode::Pc => stack.push(U256::from(*pc))?,
            Opcode::MSize => stack.push(U256::from(memory.len()))?,
            Opcode::Gas => stack.push(U256::from(contract.gas))?,
            Opcode::JumpDest => {}

            // =============================================================
            // PUSH / DUP / SWAP
            // =============================================================
            _ if op.push_bytes().is_some() => {
                let count = op.push_bytes().unwrap_or(0);
                let word = copy_padded(&contract.code, U256::from(*pc + 1), count);
                stack.push(U256::from_big_endian(&word))?;
                *pc += count;
            }

            _ if op.dup_depth().is_some() => {
                stack.dup(op.dup_depth().unwrap_or(1))?;
            }

            _ if op.swap_depth().is_some() => {
                stack.swap(op.swap_depth().unwrap_or(1))?;
            }

            // =============================================================
            // LOG
            // =============================================================
            Opcode::Log0 | Opcode::Log1 | Opcode::Log2 | Opcode::Log3 | Opcode::Log4 => {
                let offset = stack.pop()?;
                let len = stack.pop()?;
                let mut topics = Vec::with_capacity(op.log_topics().unwrap_or(0));
                for _ in 0..op.log_topics().unwrap_or(0) {
                    let mut topic = [0u8; 32];
                    stack.pop()?.to_big_endian(&mut topic);
                    topics.push(Hash::new(topic));
                }
                let data = read_memory(memory, offset, len);
                self.host.add_log(Log::new(
                    contract.address,
                    topics,
                    Bytes::from_vec(data),
                    self.env.block.number,
                ));
            }

            // =============================================================
            // SYSTEM
            // =============================================================
            Opcode::Create | Opcode::Create2 => {
                let value = stack.pop()?;
                let offset = stack.pop()?;
                let len = stack.pop()?;
                let salt = if op == Opcode::Create2 {
                    let mut word = [0u8; 32];
                    stack.pop()?.to_big_endian(&mut word);
                    Some(Hash::new(word))
                } else {
                    None
                };
                let init = Bytes::from_vec(read_memory(memory, offset, len));

                // The child gets everything but one 64th under EIP-150,
                // everything before it.
                let forwarded = if self.config.schedule.forwards_sixty_fourths() {
                    contract.gas - contract.gas / 64
                } else {
                    contract.gas
                };
                contract.gas -= forwarded;

                let created = self.execute_create(
                    contract.address,
                    value,
                    init,
                    forwarded,
                    salt,
                    read_only,
                )?;
                contract.refund_gas(created.outcome.gas_left());
                match created.address {
                    Some(address) => stack.push(address.to_word())?,
                    None => stack.push(U256::zero())?,
                }
                return Ok(Some(created.outcome.output().into_vec()));
            }

            Opcode::Call | Opcode::CallCode | Opcode::DelegateCall | Opcode::StaticCall => {
                return self.dispatch_call(op, contract, stack, memory, read_only);
            }

            Opcode::Return | Opcode::Revert => {
                let offset = stack.pop()?;
                let len = stack.pop()?;
                return Ok(Some(read_memory(memory, offset, len)));
            }

            Opcode::Suicide => {
                let beneficiary = Address::from_word(stack.pop()?);
                if !self.host.has_suicided(contract.address)? {
                    self.host.add_refund(costs::SUICIDE_REFUND);
                }
                let balance = self.host.get_balance(contract.address)?;
                self.host.transfer(contract.address, beneficiary, balance)?;
                self.host.suicide(contract.address)?;
            }

            // Valid table entries are all matched above.
            _ => return Err(VmError::InvalidOpcode(op.as_byte())),
        }

        Ok(None)
    }

    /// Pops and validates the operands of a call-family opcode, runs the
    /// nested frame and applies its outcome to the current one.
    fn dispatch_call(
        &mut self,
        op: Opcode,
        contract: &mut Contract,
        stack: &mut Stack,
        memory: &mut Memory,
        read_only: bool,
    ) -> Result<Option<Vec<u8>>, VmError> {
        // The gas argument was rewritten to the forwarded amount by the
        // pre-pass, so it always fits u64.
        let gas = stack.pop()?.as_u64();
        let to = Address::from_word(stack.pop()?);
        let value = if op == Opcode::Call || op == Opcode::CallCode {
            stack.pop()?
        } else {
            U256::zero()
        };
        let in_offset = stack.pop()?;
        let in_len = stack.pop()?;
        let out_offset = stack.pop()?;
        let out_len = stack.pop()?;

        let input = Bytes::from_vec(read_memory(memory, in_offset, in_len));

        // A non-zero value grants the callee the stipend on top of the
        // forwarded gas.
        let mut forwarded = gas;
        if !value.is_zero() && (op == Opcode::Call || op == Opcode::CallCode) {
            forwarded = forwarded.saturating_add(costs::CALL_STIPEND);
        }

        let params = match op {
            Opcode::Call => CallParams {
                kind: CallKind::Call,
                caller: contract.address,
                address: to,
                code_address: to,
                value,
                transfer: Some(value),
                input,
                gas: forwarded,
                read_only,
            },
            Opcode::CallCode => CallParams {
                kind: CallKind::CallCode,
                caller: contract.address,
                address: contract.address,
                code_address: to,
                value,
                transfer: Some(value),
                input,
                gas: forwarded,
                read_only,
            },
            Opcode::DelegateCall => CallParams {
                kind: CallKind::DelegateCall,
                caller: contract.caller,
                address: contract.address,
                code_address: to,
                value: contract.value,
                transfer: None,
                input,
                gas: forwarded,
                read_only,
            },
            _ => CallParams {
                kind: CallKind::StaticCall,
                caller: contract.address,
                address: to,
                code_address: to,
                value: U256::zero(),
                transfer: None,
                input,
                gas: forwarded,
                read_only: true,
            },
        };

        let outcome = self.execute_call(params)?;

        let output = outcome.output();
        if !out_len.is_zero() && !output.is_empty() {
            let copy = output.len().min(out_len.as_usize());
            memory.set(out_offset.as_usize(), &output.as_slice()[..copy]);
        }
        contract.refund_gas(outcome.gas_left());
        stack.push(bool_word(outcome.is_success()))?;

        Ok(Some(output.into_vec()))
    }

    /// Validates a jump destination against the code bitmap.
    fn jump_target(&mut self, contract: &mut Contract, dest: U256) -> Result<usize, VmError> {
        if dest > U256::from(u32::MAX) {
            return Err(VmError::InvalidJumpDestination(dest.low_u64() as usize));
        }
        let target = dest.as_usize();
        if !contract.valid_jump(target, &mut self.jumpdests) {
            return Err(VmError::InvalidJumpDestination(target));
        }
        Ok(target)
    }
}

// =============================================================================
// FREE HELPERS
// =============================================================================

fn bool_word(value: bool) -> U256 {
    if value {
        U256::one()
    } else {
        U256::zero()
    }
}

/// Reads a memory range whose bounds were validated by the gas pre-pass.
/// Zero-length reads are empty whatever the offset says.
fn read_memory(memory: &Memory, offset: U256, len: U256) -> Vec<u8> {
    if len.is_zero() {
        return Vec::new();
    }
    memory.get(offset.as_usize(), len.as_usize())
}

/// Copies from a source buffer into memory, zero-padding reads past the
/// end of the source. The destination was sized by the pre-pass.
fn copy_to_memory(memory: &mut Memory, dest: U256, src: &[u8], offset: U256, len: U256) {
    if len.is_zero() {
        return;
    }
    let data = copy_padded(src, offset, len.as_usize());
    memory.set(dest.as_usize(), &data);
}

/// `len` bytes of `src` starting at `offset`, zero-extended.
fn copy_padded(src: &[u8], offset: U256, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    if offset <= U256::from(usize::MAX) {
        let start = offset.as_usize();
        if start < src.len() {
            let end = (start + len).min(src.len());
            out[..end - start].copy_from_slice(&src[start..end]);
        }
    }
    out
}

// =============================================================================
// TESTS
// =============================================================================
