//! # Driving Port: Stepping Context
//!
//! The pull-style interface for hosts that own the state themselves,
//! possibly out of process. The driver opens a context with `call` or
//! `create`, then loops on `fire()`: each firing either runs to a terminal
//! status or stops at a [`Require`] naming the datum it needs; the driver
//! commits that datum and fires again.
//!
//! The machine restarts from the committed cache on every firing.
//! Execution is deterministic and the cache only grows, so the restart is
//! observationally a resumption; an in-process host that can answer every
//! lookup immediately should use [`crate::evm::Evm`] directly instead.

use crate::adapters::journal::ChangedAccount;
use crate::adapters::step_state::StepState;
use crate::domain::entities::{AccountState, BlockContext, Env, ExecutionResult, ExitReason, Log};
use crate::domain::value_objects::{Address, Bytes, Hash, StorageKey, StorageValue, U256};
use crate::errors::VmError;
use crate::evm::forks::{Fork, ForkConfig};
use crate::evm::Evm;
use std::collections::HashMap;
use tracing::debug;

pub use crate::errors::Require;

// =============================================================================
// STATUS
// =============================================================================

/// Where a stepping context stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Created, never fired.
    Inactive,
    /// Suspended on a Require.
    Running,
    /// Finished successfully.
    ExitedOk,
    /// Finished with a machine error or a revert.
    ExitedErr,
    /// Ran out of gas at the outermost frame.
    OutOfGas,
    /// The top-level value transfer had insufficient balance.
    TransferErr,
    /// Execution re-required a datum the driver already committed.
    RequireErr,
    /// The driver violated the commit protocol.
    Broken,
}

impl Status {
    /// True once no further firing can change the outcome.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Inactive | Self::Running)
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

#[derive(Clone, Debug)]
enum ContextKind {
    Call { to: Address, data: Bytes },
    Create { code: Bytes },
}

/// One suspended or finished execution, driven from outside.
pub struct VmContext {
    kind: ContextKind,
    caller: Address,
    gas: u64,
    gas_price: U256,
    value: U256,
    config: ForkConfig,

    // Driver-committed world view.
    accounts: HashMap<Address, Option<AccountState>>,
    codes: HashMap<Address, Bytes>,
    storage: HashMap<(Address, StorageKey), StorageValue>,
    hashes: HashMap<u64, Hash>,
    info: Option<BlockContext>,

    pending: Option<Require>,
    status: Status,
    result: Option<ExecutionResult>,
    changed: Vec<ChangedAccount>,
    logs: Vec<Log>,
}

impl VmContext {
    /// Opens a message-call context.
    #[must_use]
    pub fn call(
        fork: Fork,
        caller: Address,
        to: Address,
        data: Bytes,
        gas: u64,
        gas_price: U256,
        value: U256,
    ) -> Self {
        Self::with_kind(
            ContextKind::Call { to, data },
            fork,
            caller,
            gas,
            gas_price,
            value,
        )
    }

    /// Opens a contract-creation context.
    #[must_use]
    pub fn create(
        fork: Fork,
        caller: Address,
        code: Bytes,
        gas: u64,
        gas_price: U256,
        value: U256,
    ) -> Self {
        Self::with_kind(
            ContextKind::Create { code },
            fork,
            caller,
            gas,
            gas_price,
            value,
        )
    }

    fn with_kind(
        kind: ContextKind,
        fork: Fork,
        caller: Address,
        gas: u64,
        gas_price: U256,
        value: U256,
    ) -> Self {
        Self {
            kind,
            caller,
            gas,
            gas_price,
            value,
            config: ForkConfig::new(fork),
            accounts: HashMap::new(),
            codes: HashMap::new(),
            storage: HashMap::new(),
            hashes: HashMap::new(),
            info: None,
            pending: None,
            status: Status::Inactive,
            result: None,
            changed: Vec::new(),
            logs: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Commits
    // -------------------------------------------------------------------------

    /// Supplies an account summary, or None for a nonexistent account.
    pub fn commit_account(&mut self, address: Address, state: Option<AccountState>) {
        if self.take_pending(&Require::Account(address)) {
            self.accounts.insert(address, state);
        }
    }

    /// Supplies the code of an account.
    pub fn commit_code(&mut self, address: Address, code: Bytes) {
        if self.take_pending(&Require::Code(address)) {
            self.codes.insert(address, code);
        }
    }

    /// Supplies one storage slot.
    pub fn commit_value(&mut self, address: Address, key: StorageKey, value: StorageValue) {
        if self.take_pending(&Require::Storage(address, key)) {
            self.storage.insert((address, key), value);
        }
    }

    /// Supplies an ancestor block hash.
    pub fn commit_block_hash(&mut self, number: u64, hash: Hash) {
        if self.take_pending(&Require::BlockHash(number)) {
            self.hashes.insert(number, hash);
        }
    }

    /// Supplies the block context.
    pub fn commit_info(&mut self, block: BlockContext) {
        if self.take_pending(&Require::Info) {
            self.info = Some(block);
        }
    }

    /// Checks a commit against the pending require. A commit that answers
    /// nothing, or answers the wrong question, breaks the context.
    fn take_pending(&mut self, answer: &Require) -> bool {
        if self.status.is_terminal() {
            self.status = Status::Broken;
            return false;
        }
        match self.pending.take() {
            Some(pending) if pending == *answer => true,
            _ => {
                debug!(?answer, "commit out of protocol");
                self.status = Status::Broken;
                false
            }
        }
    }

    // -------------------------------------------------------------------------
    // Firing
    // -------------------------------------------------------------------------

    /// Runs until the next missing datum or a terminal status. Returns the
    /// Require to satisfy, or None once terminal.
    pub fn fire(&mut self) -> Option<Require> {
        if self.status.is_terminal() {
            self.status = Status::Broken;
            return None;
        }

        let Some(block) = self.info.clone() else {
            self.status = Status::Running;
            self.pending = Some(Require::Info);
            return Some(Require::Info);
        };

        let mut state =
            StepState::from_cache(&self.accounts, &self.codes, &self.storage, &self.hashes);
        let env = Env {
            origin: self.caller,
            gas_price: self.gas_price,
            block,
        };

        let mut evm = Evm::with_config(&mut state, env, self.config);
        let result = match &self.kind {
            ContextKind::Call { to, data } => {
                evm.call(self.caller, *to, data.clone(), self.gas, self.value)
            }
            ContextKind::Create { code } => {
                evm.create(self.caller, code.clone(), self.gas, self.value)
            }
        };

        if let ExitReason::Error(VmError::Require(require)) = &result.exit {
            let require = *require;
            if self.is_committed(&require) {
                // The state answered this before; requiring it again means
                // the committed data is inconsistent.
                self.status = Status::RequireErr;
                return None;
            }
            self.status = Status::Running;
            self.pending = Some(require);
            return Some(require);
        }

        self.status = match &result.exit {
            ExitReason::Succeed => Status::ExitedOk,
            ExitReason::Revert => Status::ExitedErr,
            ExitReason::Error(VmError::OutOfGas) => Status::OutOfGas,
            ExitReason::Error(VmError::TransferFailed { .. }) => Status::TransferErr,
            ExitReason::Error(_) => Status::ExitedErr,
        };
        self.changed = state.changed_accounts();
        self.logs = state.logs().to_vec();
        self.result = Some(result);
        None
    }

    fn is_committed(&self, require: &Require) -> bool {
        match require {
            Require::Account(address) => self.accounts.contains_key(address),
            Require::Code(address) => self.codes.contains_key(address),
            Require::Storage(address, key) => self.storage.contains_key(&(*address, *key)),
            Require::BlockHash(number) => self.hashes.contains_key(number),
            Require::Info => self.info.is_some(),
        }
    }

    // -------------------------------------------------------------------------
    // Results
    // -------------------------------------------------------------------------

    /// Current status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Output bytes, gas remaining and accrued refund. Meaningful once a
    /// terminal status is reached; zeroes before that.
    #[must_use]
    pub fn out(&self) -> (Bytes, u64, u64) {
        match &self.result {
            Some(result) => (result.output.clone(), result.gas_left, result.refund),
            None => (Bytes::new(), 0, 0),
        }
    }

    /// True when the execution finished through REVERT.
    #[must_use]
    pub fn reverted(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(|result| result.exit.is_revert())
    }

    /// Address deployed by a finished create context.
    #[must_use]
    pub fn address(&self) -> Option<Address> {
        self.result.as_ref().and_then(|result| result.address)
    }

    /// Accounts changed by a finished execution.
    #[must_use]
    pub fn accounts(&self) -> &[ChangedAccount] {
        &self.changed
    }

    /// Logs emitted by a finished execution.
    #[must_use]
    pub fn logs(&self) -> &[Log] {
        &self.logs
    }
}

// =============================================================================
// TESTS
// =============================================================================
