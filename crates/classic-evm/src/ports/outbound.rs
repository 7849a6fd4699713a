//! # Driven Port: Host
//!
//! The capability interface the interpreter consumes. An embedded host
//! (the journalled in-memory state) answers every call immediately; a
//! step-mode host answers from a driver-fed cache and reports a missing
//! datum as [`VmError::Require`], suspending the execution.
//!
//! Write operations must be atomic with respect to the next interpreter
//! step, and must be undone by `revert_to_snapshot`.

use crate::domain::entities::{AccountState, Log};
use crate::domain::value_objects::{Address, Bytes, Hash, StorageKey, StorageValue, U256};
use crate::errors::VmError;

/// State, block-hash and journal capabilities provided by the environment.
pub trait Host {
    // -------------------------------------------------------------------------
    // Accounts
    // -------------------------------------------------------------------------

    /// Account summary, or None when the account does not exist.
    fn get_account(&mut self, address: Address) -> Result<Option<AccountState>, VmError>;

    /// Balance of an address (zero for absent accounts).
    fn get_balance(&mut self, address: Address) -> Result<U256, VmError>;

    /// Credits `amount`, creating the account when needed.
    fn add_balance(&mut self, address: Address, amount: U256) -> Result<(), VmError>;

    /// Debits `amount`.
    fn sub_balance(&mut self, address: Address, amount: U256) -> Result<(), VmError>;

    /// Nonce of an address (zero for absent accounts).
    fn get_nonce(&mut self, address: Address) -> Result<u64, VmError>;

    /// Sets the nonce, creating the account when needed.
    fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<(), VmError>;

    /// Creates an empty account (explicit creation marker).
    fn create_account(&mut self, address: Address) -> Result<(), VmError>;

    /// True when the account exists in any form.
    fn exists(&mut self, address: Address) -> Result<bool, VmError>;

    /// True when nonce, balance and code are all empty.
    fn empty(&mut self, address: Address) -> Result<bool, VmError>;

    // -------------------------------------------------------------------------
    // Code
    // -------------------------------------------------------------------------

    /// Code of an address (empty for absent accounts and EOAs).
    fn get_code(&mut self, address: Address) -> Result<Bytes, VmError>;

    /// Installs code, updating the code hash.
    fn set_code(&mut self, address: Address, code: Bytes) -> Result<(), VmError>;

    /// Keccak-256 of the account code.
    fn get_code_hash(&mut self, address: Address) -> Result<Hash, VmError>;

    /// Length of the account code.
    fn get_code_size(&mut self, address: Address) -> Result<usize, VmError> {
        Ok(self.get_code(address)?.len())
    }

    // -------------------------------------------------------------------------
    // Storage
    // -------------------------------------------------------------------------

    /// Storage slot value (zero for absent slots).
    fn get_storage(&mut self, address: Address, key: StorageKey)
        -> Result<StorageValue, VmError>;

    /// Slot value at the start of the transaction, before any write.
    /// Only consulted by net-metered SSTORE.
    fn get_original_storage(
        &mut self,
        address: Address,
        key: StorageKey,
    ) -> Result<StorageValue, VmError>;

    /// Writes a storage slot.
    fn set_storage(
        &mut self,
        address: Address,
        key: StorageKey,
        value: StorageValue,
    ) -> Result<(), VmError>;

    // -------------------------------------------------------------------------
    // Suicides, refunds, logs
    // -------------------------------------------------------------------------

    /// Flags the account for deletion at the end of the transaction.
    fn suicide(&mut self, address: Address) -> Result<(), VmError>;

    /// True when the account is already flagged.
    fn has_suicided(&mut self, address: Address) -> Result<bool, VmError>;

    /// Accrues to the transaction refund counter.
    fn add_refund(&mut self, amount: u64);

    /// Removes from the refund counter (net-metered SSTORE).
    fn sub_refund(&mut self, amount: u64);

    /// Current refund counter.
    fn get_refund(&self) -> u64;

    /// Appends a log record.
    fn add_log(&mut self, log: Log);

    // -------------------------------------------------------------------------
    // Transfers
    // -------------------------------------------------------------------------

    /// True when `from` holds at least `amount`.
    fn can_transfer(&mut self, from: Address, amount: U256) -> Result<bool, VmError> {
        Ok(self.get_balance(from)? >= amount)
    }

    /// Moves `amount` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// `TransferFailed` on insufficient balance.
    fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), VmError> {
        let available = self.get_balance(from)?;
        if available < amount {
            return Err(VmError::TransferFailed {
                required: amount,
                available,
            });
        }
        self.sub_balance(from, amount)?;
        self.add_balance(to, amount)
    }

    // -------------------------------------------------------------------------
    // Journal
    // -------------------------------------------------------------------------

    /// Opens a snapshot and returns its id. Snapshots nest.
    fn snapshot(&mut self) -> usize;

    /// Rolls back to snapshot `id`, implicitly discarding any snapshots
    /// opened after it.
    fn revert_to_snapshot(&mut self, id: usize);

    // -------------------------------------------------------------------------
    // Block hashes
    // -------------------------------------------------------------------------

    /// Hash of ancestor block `number`. Only called for numbers within 256
    /// of the current block.
    fn get_block_hash(&mut self, number: u64) -> Result<Hash, VmError>;
}
