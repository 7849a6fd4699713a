//! # Journalled State
//!
//! The embedded in-memory state: a keyed collection of accounts where
//! every mutation appends an undo record. Snapshots are positions in the
//! undo log; reverting truncates back to one, implicitly discarding any
//! snapshots opened after it.

use crate::domain::entities::{AccountState, Log};
use crate::domain::services::keccak256;
use crate::domain::value_objects::{Address, Bytes, Hash, StorageKey, StorageValue, U256};
use crate::errors::VmError;
use crate::ports::outbound::Host;
use std::collections::{BTreeSet, HashMap};

// =============================================================================
// ACCOUNT
// =============================================================================

#[derive(Clone, Debug)]
struct Account {
    nonce: u64,
    balance: U256,
    code: Bytes,
    code_hash: Hash,
    storage: HashMap<StorageKey, StorageValue>,
    suicided: bool,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::zero(),
            code: Bytes::new(),
            code_hash: AccountState::EMPTY_CODE_HASH,
            storage: HashMap::new(),
            suicided: false,
        }
    }
}

impl Account {
    fn summary(&self) -> AccountState {
        AccountState {
            nonce: self.nonce,
            balance: self.balance,
            code_hash: self.code_hash,
        }
    }

    fn is_empty(&self) -> bool {
        self.nonce == 0
            && self.balance.is_zero()
            && (self.code_hash == AccountState::EMPTY_CODE_HASH || self.code_hash == Hash::ZERO)
    }
}

// =============================================================================
// JOURNAL
// =============================================================================

/// One undo record. Applied in reverse order on revert.
#[derive(Clone, Debug)]
enum JournalEntry {
    AccountCreated {
        address: Address,
    },
    BalanceChanged {
        address: Address,
        prev: U256,
    },
    NonceChanged {
        address: Address,
        prev: u64,
    },
    CodeChanged {
        address: Address,
        prev_code: Bytes,
        prev_hash: Hash,
    },
    StorageChanged {
        address: Address,
        key: StorageKey,
        prev: Option<StorageValue>,
    },
    SuicideMarked {
        address: Address,
        prev: bool,
    },
    RefundChanged {
        prev: u64,
    },
    LogEmitted,
}

/// A changed account as reported to drivers after execution.
#[derive(Clone, Debug)]
pub struct ChangedAccount {
    /// The account address.
    pub address: Address,
    /// Post-state summary; None when the account no longer exists.
    pub state: Option<AccountState>,
    /// Storage slots written during execution, with their final values.
    pub storage: Vec<(StorageKey, StorageValue)>,
    /// New code, when code was installed.
    pub code: Option<Bytes>,
    /// Flagged for deletion by SELFDESTRUCT.
    pub suicided: bool,
}

// =============================================================================
// STATE
// =============================================================================

/// In-memory account state with journalled mutation.
#[derive(Debug, Default)]
pub struct JournaledState {
    accounts: HashMap<Address, Account>,
    logs: Vec<Log>,
    refund: u64,
    journal: Vec<JournalEntry>,
    snapshots: Vec<usize>,
    block_hashes: HashMap<u64, Hash>,
    original_storage: HashMap<(Address, StorageKey), StorageValue>,
}

impl JournaledState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Seeding (not journalled; used to build pre-state)
    // -------------------------------------------------------------------------

    /// Sets a balance directly.
    pub fn seed_balance(&mut self, address: Address, balance: U256) {
        self.accounts.entry(address).or_default().balance = balance;
    }

    /// Sets a nonce directly.
    pub fn seed_nonce(&mut self, address: Address, nonce: u64) {
        self.accounts.entry(address).or_default().nonce = nonce;
    }

    /// Installs code directly.
    pub fn seed_code(&mut self, address: Address, code: Bytes) {
        let account = self.accounts.entry(address).or_default();
        account.code_hash = if code.is_empty() {
            AccountState::EMPTY_CODE_HASH
        } else {
            keccak256(code.as_slice())
        };
        account.code = code;
    }

    /// Writes a storage slot directly.
    pub fn seed_storage(&mut self, address: Address, key: StorageKey, value: StorageValue) {
        self.accounts
            .entry(address)
            .or_default()
            .storage
            .insert(key, value);
    }

    /// Sets a code hash without the code bytes. Used when seeding from an
    /// account summary whose code has not been fetched.
    pub fn seed_code_hash(&mut self, address: Address, hash: Hash) {
        self.accounts.entry(address).or_default().code_hash = hash;
    }

    /// Registers an ancestor block hash for BLOCKHASH.
    pub fn seed_block_hash(&mut self, number: u64, hash: Hash) {
        self.block_hashes.insert(number, hash);
    }

    /// Creates an account without journalling.
    pub fn seed_account(&mut self, address: Address) {
        self.accounts.entry(address).or_default();
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Logs emitted so far.
    #[must_use]
    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    /// Every account the journal touched, with its post-state.
    #[must_use]
    pub fn changed_accounts(&self) -> Vec<ChangedAccount> {
        let mut dirty: BTreeSet<Address> = BTreeSet::new();
        let mut dirty_storage: HashMap<Address, BTreeSet<StorageKey>> = HashMap::new();
        let mut dirty_code: BTreeSet<Address> = BTreeSet::new();

        for entry in &self.journal {
            match entry {
                JournalEntry::AccountCreated { address }
                | JournalEntry::BalanceChanged { address, .. }
                | JournalEntry::NonceChanged { address, .. }
                | JournalEntry::SuicideMarked { address, .. } => {
                    dirty.insert(*address);
                }
                JournalEntry::CodeChanged { address, .. } => {
                    dirty.insert(*address);
                    dirty_code.insert(*address);
                }
                JournalEntry::StorageChanged { address, key, .. } => {
                    dirty.insert(*address);
                    dirty_storage.entry(*address).or_default().insert(*key);
                }
                JournalEntry::RefundChanged { .. } | JournalEntry::LogEmitted => {}
            }
        }

        dirty
            .into_iter()
            .map(|address| {
                let account = self.accounts.get(&address);
                ChangedAccount {
                    address,
                    state: account.map(Account::summary),
                    storage: dirty_storage
                        .remove(&address)
                        .unwrap_or_default()
                        .into_iter()
                        .map(|key| {
                            let value = account
                                .and_then(|a| a.storage.get(&key).copied())
                                .unwrap_or(StorageValue::ZERO);
                            (key, value)
                        })
                        .collect(),
                    code: if dirty_code.contains(&address) {
                        account.map(|a| a.code.clone())
                    } else {
                        None
                    },
                    suicided: account.is_some_and(|a| a.suicided),
                }
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Finalisation
    // -------------------------------------------------------------------------

    /// Applies end-of-transaction effects: suicided accounts are deleted
    /// and the journal, refund counter and original-storage records reset.
    pub fn finalize(&mut self) {
        self.accounts.retain(|_, account| !account.suicided);
        self.journal.clear();
        self.snapshots.clear();
        self.refund = 0;
        self.original_storage.clear();
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn account_mut(&mut self, address: Address) -> &mut Account {
        match self.accounts.entry(address) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                self.journal.push(JournalEntry::AccountCreated { address });
                entry.insert(Account::default())
            }
        }
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::AccountCreated { address } => {
                self.accounts.remove(&address);
            }
            JournalEntry::BalanceChanged { address, prev } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.balance = prev;
                }
            }
            JournalEntry::NonceChanged { address, prev } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.nonce = prev;
                }
            }
            JournalEntry::CodeChanged {
                address,
                prev_code,
                prev_hash,
            } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.code = prev_code;
                    account.code_hash = prev_hash;
                }
            }
            JournalEntry::StorageChanged { address, key, prev } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    match prev {
                        Some(value) => {
                            account.storage.insert(key, value);
                        }
                        None => {
                            account.storage.remove(&key);
                        }
                    }
                }
            }
            JournalEntry::SuicideMarked { address, prev } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.suicided = prev;
                }
            }
            JournalEntry::RefundChanged { prev } => {
                self.refund = prev;
            }
            JournalEntry::LogEmitted => {
                self.logs.pop();
            }
        }
    }
}

// =============================================================================
// HOST IMPLEMENTATION
// =============================================================================

impl Host for JournaledState {
    fn get_account(&mut self, address: Address) -> Result<Option<AccountState>, VmError> {
        Ok(self.accounts.get(&address).map(Account::summary))
    }

    fn get_balance(&mut self, address: Address) -> Result<U256, VmError> {
        Ok(self
            .accounts
            .get(&address)
            .map(|a| a.balance)
            .unwrap_or_default())
    }

    fn add_balance(&mut self, address: Address, amount: U256) -> Result<(), VmError> {
        let account = self.account_mut(address);
        let prev = account.balance;
        account.balance = prev.overflowing_add(amount).0;
        self.journal
            .push(JournalEntry::BalanceChanged { address, prev });
        Ok(())
    }

    fn sub_balance(&mut self, address: Address, amount: U256) -> Result<(), VmError> {
        let account = self.account_mut(address);
        let prev = account.balance;
        account.balance = prev.saturating_sub(amount);
        self.journal
            .push(JournalEntry::BalanceChanged { address, prev });
        Ok(())
    }

    fn get_nonce(&mut self, address: Address) -> Result<u64, VmError> {
        Ok(self
            .accounts
            .get(&address)
            .map(|a| a.nonce)
            .unwrap_or_default())
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<(), VmError> {
        let account = self.account_mut(address);
        let prev = account.nonce;
        account.nonce = nonce;
        self.journal
            .push(JournalEntry::NonceChanged { address, prev });
        Ok(())
    }

    fn create_account(&mut self, address: Address) -> Result<(), VmError> {
        self.account_mut(address);
        Ok(())
    }

    fn exists(&mut self, address: Address) -> Result<bool, VmError> {
        Ok(self.accounts.contains_key(&address))
    }

    fn empty(&mut self, address: Address) -> Result<bool, VmError> {
        Ok(self
            .accounts
            .get(&address)
            .map(Account::is_empty)
            .unwrap_or(true))
    }

    fn get_code(&mut self, address: Address) -> Result<Bytes, VmError> {
        Ok(self
            .accounts
            .get(&address)
            .map(|a| a.code.clone())
            .unwrap_or_default())
    }

    fn set_code(&mut self, address: Address, code: Bytes) -> Result<(), VmError> {
        let hash = if code.is_empty() {
            AccountState::EMPTY_CODE_HASH
        } else {
            keccak256(code.as_slice())
        };
        let account = self.account_mut(address);
        let prev_code = std::mem::take(&mut account.code);
        let prev_hash = account.code_hash;
        account.code = code;
        account.code_hash = hash;
        self.journal.push(JournalEntry::CodeChanged {
            address,
            prev_code,
            prev_hash,
        });
        Ok(())
    }

    fn get_code_hash(&mut self, address: Address) -> Result<Hash, VmError> {
        Ok(self
            .accounts
            .get(&address)
            .map(|a| a.code_hash)
            .unwrap_or(Hash::ZERO))
    }

    fn get_storage(&mut self, address: Address, key: StorageKey) -> Result<StorageValue, VmError> {
        Ok(self
            .accounts
            .get(&address)
            .and_then(|a| a.storage.get(&key).copied())
            .unwrap_or(StorageValue::ZERO))
    }

    fn get_original_storage(
        &mut self,
        address: Address,
        key: StorageKey,
    ) -> Result<StorageValue, VmError> {
        if let Some(value) = self.original_storage.get(&(address, key)) {
            return Ok(*value);
        }
        self.get_storage(address, key)
    }

    fn set_storage(
        &mut self,
        address: Address,
        key: StorageKey,
        value: StorageValue,
    ) -> Result<(), VmError> {
        let prev = {
            let account = self.account_mut(address);
            account.storage.insert(key, value)
        };
        self.original_storage
            .entry((address, key))
            .or_insert_with(|| prev.unwrap_or(StorageValue::ZERO));
        self.journal
            .push(JournalEntry::StorageChanged { address, key, prev });
        Ok(())
    }

    fn suicide(&mut self, address: Address) -> Result<(), VmError> {
        let account = self.account_mut(address);
        let prev = account.suicided;
        account.suicided = true;
        self.journal
            .push(JournalEntry::SuicideMarked { address, prev });
        Ok(())
    }

    fn has_suicided(&mut self, address: Address) -> Result<bool, VmError> {
        Ok(self
            .accounts
            .get(&address)
            .map(|a| a.suicided)
            .unwrap_or(false))
    }

    fn add_refund(&mut self, amount: u64) {
        self.journal
            .push(JournalEntry::RefundChanged { prev: self.refund });
        self.refund = self.refund.saturating_add(amount);
    }

    fn sub_refund(&mut self, amount: u64) {
        self.journal
            .push(JournalEntry::RefundChanged { prev: self.refund });
        self.refund = self.refund.saturating_sub(amount);
    }

    fn get_refund(&self) -> u64 {
        self.refund
    }

    fn add_log(&mut self, log: Log) {
        self.logs.push(log);
        self.journal.push(JournalEntry::LogEmitted);
    }

    fn snapshot(&mut self) -> usize {
        let id = self.snapshots.len();
        self.snapshots.push(self.journal.len());
        id
    }

    fn revert_to_snapshot(&mut self, id: usize) {
        let Some(&target) = self.snapshots.get(id) else {
            return;
        };
        while self.journal.len() > target {
            if let Some(entry) = self.journal.pop() {
                self.undo(entry);
            }
        }
        self.snapshots.truncate(id);
    }

    fn get_block_hash(&mut self, number: u64) -> Result<Hash, VmError> {
        Ok(self
            .block_hashes
            .get(&number)
            .copied()
            .unwrap_or(Hash::ZERO))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::new([n; 20])
    }

    #[test]
    fn test_absent_account_reads_zero() {
        let mut state = JournaledState::new();
        assert_eq!(state.get_balance(addr(1)).unwrap(), U256::zero());
        assert_eq!(state.get_nonce(addr(1)).unwrap(), 0);
        assert!(state.get_code(addr(1)).unwrap().is_empty());
        assert_eq!(
            state.get_storage(addr(1), StorageKey::ZERO).unwrap(),
            StorageValue::ZERO
        );
        assert!(!state.exists(addr(1)).unwrap());
        assert!(state.empty(addr(1)).unwrap());
    }

    #[test]
    fn test_snapshot_revert_balance() {
        let mut state = JournaledState::new();
        state.seed_balance(addr(1), U256::from(100));

        let snapshot = state.snapshot();
        state.add_balance(addr(1), U256::from(50)).unwrap();
        state.sub_balance(addr(1), U256::from(30)).unwrap();
        assert_eq!(state.get_balance(addr(1)).unwrap(), U256::from(120));

        state.revert_to_snapshot(snapshot);
        assert_eq!(state.get_balance(addr(1)).unwrap(), U256::from(100));
    }

    #[test]
    fn test_revert_removes_created_accounts() {
        let mut state = JournaledState::new();
        let snapshot = state.snapshot();
        state.add_balance(addr(2), U256::from(5)).unwrap();
        assert!(state.exists(addr(2)).unwrap());

        state.revert_to_snapshot(snapshot);
        assert!(!state.exists(addr(2)).unwrap());
    }

    #[test]
    fn test_nested_snapshots() {
        let mut state = JournaledState::new();
        state.seed_balance(addr(1), U256::from(1));

        let outer = state.snapshot();
        state.add_balance(addr(1), U256::from(10)).unwrap();
        let _inner = state.snapshot();
        state.add_balance(addr(1), U256::from(100)).unwrap();

        // Reverting the outer snapshot discards the inner one too.
        state.revert_to_snapshot(outer);
        assert_eq!(state.get_balance(addr(1)).unwrap(), U256::from(1));

        // A fresh snapshot reuses the freed id space.
        assert_eq!(state.snapshot(), outer);
    }

    #[test]
    fn test_storage_revert_to_absent() {
        let mut state = JournaledState::new();
        let key = StorageKey::from_u256(U256::zero());

        let snapshot = state.snapshot();
        state
            .set_storage(addr(1), key, StorageValue::from_u256(U256::from(7)))
            .unwrap();
        assert_eq!(
            state.get_storage(addr(1), key).unwrap().to_u256(),
            U256::from(7)
        );

        state.revert_to_snapshot(snapshot);
        assert_eq!(state.get_storage(addr(1), key).unwrap(), StorageValue::ZERO);
    }

    #[test]
    fn test_original_storage_survives_writes() {
        let mut state = JournaledState::new();
        let key = StorageKey::from_u256(U256::zero());
        state.seed_storage(addr(1), key, StorageValue::from_u256(U256::from(1)));

        state
            .set_storage(addr(1), key, StorageValue::from_u256(U256::from(2)))
            .unwrap();
        state
            .set_storage(addr(1), key, StorageValue::from_u256(U256::from(3)))
            .unwrap();

        assert_eq!(
            state.get_original_storage(addr(1), key).unwrap().to_u256(),
            U256::from(1)
        );
        assert_eq!(state.get_storage(addr(1), key).unwrap().to_u256(), U256::from(3));
    }

    #[test]
    fn test_code_install_updates_hash() {
        let mut state = JournaledState::new();
        let code = Bytes::from_slice(&[0x60, 0x00]);
        state.set_code(addr(1), code.clone()).unwrap();

        assert_eq!(state.get_code(addr(1)).unwrap(), code);
        assert_eq!(
            state.get_code_hash(addr(1)).unwrap(),
            keccak256(code.as_slice())
        );
        assert_eq!(state.get_code_size(addr(1)).unwrap(), 2);
    }

    #[test]
    fn test_suicide_keeps_balance_until_finalize() {
        let mut state = JournaledState::new();
        state.seed_balance(addr(1), U256::from(10));

        state.suicide(addr(1)).unwrap();
        assert!(state.has_suicided(addr(1)).unwrap());
        // Balance operations still work on the flagged account.
        state.add_balance(addr(1), U256::from(5)).unwrap();
        assert_eq!(state.get_balance(addr(1)).unwrap(), U256::from(15));

        state.finalize();
        assert!(!state.exists(addr(1)).unwrap());
    }

    #[test]
    fn test_refund_journalling() {
        let mut state = JournaledState::new();
        let snapshot = state.snapshot();
        state.add_refund(15_000);
        assert_eq!(state.get_refund(), 15_000);
        state.sub_refund(5_000);
        assert_eq!(state.get_refund(), 10_000);

        state.revert_to_snapshot(snapshot);
        assert_eq!(state.get_refund(), 0);
    }

    #[test]
    fn test_logs_revert_with_snapshot() {
        let mut state = JournaledState::new();
        let snapshot = state.snapshot();
        state.add_log(Log::new(addr(1), Vec::new(), Bytes::new(), 1));
        assert_eq!(state.logs().len(), 1);

        state.revert_to_snapshot(snapshot);
        assert!(state.logs().is_empty());
    }

    #[test]
    fn test_transfer() {
        let mut state = JournaledState::new();
        state.seed_balance(addr(1), U256::from(100));

        state.transfer(addr(1), addr(2), U256::from(40)).unwrap();
        assert_eq!(state.get_balance(addr(1)).unwrap(), U256::from(60));
        assert_eq!(state.get_balance(addr(2)).unwrap(), U256::from(40));

        let err = state.transfer(addr(1), addr(2), U256::from(1000)).unwrap_err();
        assert!(matches!(err, VmError::TransferFailed { .. }));
    }

    #[test]
    fn test_changed_accounts() {
        let mut state = JournaledState::new();
        state.seed_balance(addr(1), U256::from(100));

        state.transfer(addr(1), addr(2), U256::from(10)).unwrap();
        state
            .set_storage(addr(2), StorageKey::ZERO, StorageValue::from_u256(U256::one()))
            .unwrap();

        let changed = state.changed_accounts();
        assert_eq!(changed.len(), 2);
        let two = changed.iter().find(|c| c.address == addr(2)).unwrap();
        assert_eq!(two.state.as_ref().unwrap().balance, U256::from(10));
        assert_eq!(two.storage.len(), 1);
    }
}
