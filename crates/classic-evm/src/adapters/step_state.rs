//! # Step-Mode State
//!
//! A host backed entirely by driver-committed data. Reads of anything the
//! driver has not supplied yet surface as [`VmError::Require`], which the
//! stepping context relays to the driver; writes journal normally. Because
//! execution is deterministic and the cache only grows, restarting from
//! the cache after each commit is equivalent to resuming in place.

use crate::adapters::journal::{ChangedAccount, JournaledState};
use crate::domain::entities::{AccountState, Log};
use crate::domain::value_objects::{Address, Bytes, Hash, StorageKey, StorageValue, U256};
use crate::errors::{Require, VmError};
use crate::ports::outbound::Host;
use std::collections::{HashMap, HashSet};

/// Journalled state over a partial, driver-fed view of the world.
pub struct StepState {
    journal: JournaledState,
    /// Accounts whose summary the driver committed as existing.
    known_accounts: HashSet<Address>,
    /// Addresses whose code bytes were committed.
    known_code: HashSet<Address>,
    /// Individually committed storage slots.
    known_storage: HashSet<(Address, StorageKey)>,
    /// Fully known empty starts: accounts committed as nonexistent plus
    /// accounts created during this execution.
    fresh: HashSet<Address>,
    /// Committed ancestor hashes.
    known_hashes: HashSet<u64>,
}

impl StepState {
    /// Seeds a state from the driver's committed cache.
    #[must_use]
    pub fn from_cache(
        accounts: &HashMap<Address, Option<AccountState>>,
        codes: &HashMap<Address, Bytes>,
        storage: &HashMap<(Address, StorageKey), StorageValue>,
        hashes: &HashMap<u64, Hash>,
    ) -> Self {
        let mut journal = JournaledState::new();
        let mut known_accounts = HashSet::new();
        let mut fresh = HashSet::new();

        for (address, state) in accounts {
            match state {
                Some(state) => {
                    journal.seed_nonce(*address, state.nonce);
                    journal.seed_balance(*address, state.balance);
                    journal.seed_code_hash(*address, state.code_hash);
                    known_accounts.insert(*address);
                }
                None => {
                    fresh.insert(*address);
                }
            }
        }
        for (address, code) in codes {
            journal.seed_code(*address, code.clone());
        }
        for ((address, key), value) in storage {
            journal.seed_storage(*address, *key, *value);
        }
        for (number, hash) in hashes {
            journal.seed_block_hash(*number, *hash);
        }

        Self {
            journal,
            known_accounts,
            known_code: codes.keys().copied().collect(),
            known_storage: storage.keys().copied().collect(),
            fresh,
            known_hashes: hashes.keys().copied().collect(),
        }
    }

    /// Changed accounts after a terminal run.
    #[must_use]
    pub fn changed_accounts(&self) -> Vec<ChangedAccount> {
        self.journal.changed_accounts()
    }

    /// Logs emitted during the run.
    #[must_use]
    pub fn logs(&self) -> &[Log] {
        self.journal.logs()
    }

    fn require_account(&self, address: Address) -> Result<(), VmError> {
        if self.known_accounts.contains(&address) || self.fresh.contains(&address) {
            Ok(())
        } else {
            Err(VmError::Require(Require::Account(address)))
        }
    }

    fn require_code(&mut self, address: Address) -> Result<(), VmError> {
        if self.known_code.contains(&address) || self.fresh.contains(&address) {
            return Ok(());
        }
        // A committed summary with the empty code hash implies empty code.
        if self.known_accounts.contains(&address)
            && self.journal.get_code_hash(address)? == AccountState::EMPTY_CODE_HASH
        {
            return Ok(());
        }
        Err(VmError::Require(Require::Code(address)))
    }

    fn require_storage(&self, address: Address, key: StorageKey) -> Result<(), VmError> {
        if self.known_storage.contains(&(address, key)) || self.fresh.contains(&address) {
            Ok(())
        } else {
            Err(VmError::Require(Require::Storage(address, key)))
        }
    }
}

impl Host for StepState {
    fn get_account(&mut self, address: Address) -> Result<Option<AccountState>, VmError> {
        self.require_account(address)?;
        self.journal.get_account(address)
    }

    fn get_balance(&mut self, address: Address) -> Result<U256, VmError> {
        self.require_account(address)?;
        self.journal.get_balance(address)
    }

    fn add_balance(&mut self, address: Address, amount: U256) -> Result<(), VmError> {
        self.require_account(address)?;
        self.journal.add_balance(address, amount)
    }

    fn sub_balance(&mut self, address: Address, amount: U256) -> Result<(), VmError> {
        self.require_account(address)?;
        self.journal.sub_balance(address, amount)
    }

    fn get_nonce(&mut self, address: Address) -> Result<u64, VmError> {
        self.require_account(address)?;
        self.journal.get_nonce(address)
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<(), VmError> {
        self.require_account(address)?;
        self.journal.set_nonce(address, nonce)
    }

    fn create_account(&mut self, address: Address) -> Result<(), VmError> {
        self.require_account(address)?;
        self.fresh.insert(address);
        self.journal.create_account(address)
    }

    fn exists(&mut self, address: Address) -> Result<bool, VmError> {
        self.require_account(address)?;
        self.journal.exists(address)
    }

    fn empty(&mut self, address: Address) -> Result<bool, VmError> {
        self.require_account(address)?;
        self.journal.empty(address)
    }

    fn get_code(&mut self, address: Address) -> Result<Bytes, VmError> {
        self.require_code(address)?;
        self.journal.get_code(address)
    }

    fn set_code(&mut self, address: Address, code: Bytes) -> Result<(), VmError> {
        self.require_account(address)?;
        self.known_code.insert(address);
        self.journal.set_code(address, code)
    }

    fn get_code_hash(&mut self, address: Address) -> Result<Hash, VmError> {
        self.require_account(address)?;
        self.journal.get_code_hash(address)
    }

    fn get_storage(&mut self, address: Address, key: StorageKey) -> Result<StorageValue, VmError> {
        self.require_storage(address, key)?;
        self.journal.get_storage(address, key)
    }

    fn get_original_storage(
        &mut self,
        address: Address,
        key: StorageKey,
    ) -> Result<StorageValue, VmError> {
        self.require_storage(address, key)?;
        self.journal.get_original_storage(address, key)
    }

    fn set_storage(
        &mut self,
        address: Address,
        key: StorageKey,
        value: StorageValue,
    ) -> Result<(), VmError> {
        self.require_storage(address, key)?;
        self.known_storage.insert((address, key));
        self.journal.set_storage(address, key, value)
    }

    fn suicide(&mut self, address: Address) -> Result<(), VmError> {
        self.journal.suicide(address)
    }

    fn has_suicided(&mut self, address: Address) -> Result<bool, VmError> {
        self.journal.has_suicided(address)
    }

    fn add_refund(&mut self, amount: u64) {
        self.journal.add_refund(amount);
    }

    fn sub_refund(&mut self, amount: u64) {
        self.journal.sub_refund(amount);
    }

    fn get_refund(&self) -> u64 {
        self.journal.get_refund()
    }

    fn add_log(&mut self, log: Log) {
        self.journal.add_log(log);
    }

    fn snapshot(&mut self) -> usize {
        self.journal.snapshot()
    }

    fn revert_to_snapshot(&mut self, id: usize) {
        self.journal.revert_to_snapshot(id);
    }

    fn get_block_hash(&mut self, number: u64) -> Result<Hash, VmError> {
        if !self.known_hashes.contains(&number) {
            return Err(VmError::Require(Require::BlockHash(number)));
        }
        self.journal.get_block_hash(number)
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

    fn empty_cache() -> (
        HashMap<Address, Option<AccountState>>,
        HashMap<Address, Bytes>,
        HashMap<(Address, StorageKey), StorageValue>,
        HashMap<u64, Hash>,
    ) {
        (
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
        )
    }

    #[test]
    fn test_unknown_account_requires() {
        let (a, c, s, h) = empty_cache();
        let mut state = StepState::from_cache(&a, &c, &s, &h);
        assert_eq!(
            state.get_balance(addr(1)),
            Err(VmError::Require(Require::Account(addr(1))))
        );
    }

    #[test]
    fn test_committed_account_reads() {
        let (mut a, c, s, h) = empty_cache();
        a.insert(addr(1), Some(AccountState::new_eoa(U256::from(100), 3)));
        let mut state = StepState::from_cache(&a, &c, &s, &h);

        assert_eq!(state.get_balance(addr(1)).unwrap(), U256::from(100));
        assert_eq!(state.get_nonce(addr(1)).unwrap(), 3);
        // Empty code hash means code is derivably empty: no code require.
        assert!(state.get_code(addr(1)).unwrap().is_empty());
    }

    #[test]
    fn test_contract_account_requires_code() {
        let (mut a, c, s, h) = empty_cache();
        let state_with_code = AccountState {
            nonce: 1,
            balance: U256::zero(),
            code_hash: crate::domain::services::keccak256(&[0x00]),
        };
        a.insert(addr(1), Some(state_with_code));
        let mut state = StepState::from_cache(&a, &c, &s, &h);

        assert_eq!(
            state.get_code(addr(1)),
            Err(VmError::Require(Require::Code(addr(1))))
        );
    }

    #[test]
    fn test_nonexistent_commit_is_fully_known() {
        let (mut a, c, s, h) = empty_cache();
        a.insert(addr(1), None);
        let mut state = StepState::from_cache(&a, &c, &s, &h);

        assert!(!state.exists(addr(1)).unwrap());
        assert_eq!(state.get_balance(addr(1)).unwrap(), U256::zero());
        assert!(state.get_code(addr(1)).unwrap().is_empty());
        assert_eq!(
            state.get_storage(addr(1), StorageKey::ZERO).unwrap(),
            StorageValue::ZERO
        );
    }

    #[test]
    fn test_storage_requires_per_slot() {
        let (mut a, c, mut s, h) = empty_cache();
        a.insert(addr(1), Some(AccountState::new_eoa(U256::zero(), 0)));
        let key = StorageKey::from_u256(U256::zero());
        s.insert((addr(1), key), StorageValue::from_u256(U256::from(7)));
        let mut state = StepState::from_cache(&a, &c, &s, &h);

        assert_eq!(state.get_storage(addr(1), key).unwrap().to_u256(), U256::from(7));

        let other = StorageKey::from_u256(U256::one());
        assert_eq!(
            state.get_storage(addr(1), other),
            Err(VmError::Require(Require::Storage(addr(1), other)))
        );
    }

    #[test]
    fn test_written_slot_becomes_known() {
        let (mut a, c, mut s, h) = empty_cache();
        a.insert(addr(1), Some(AccountState::new_eoa(U256::zero(), 0)));
        let key = StorageKey::from_u256(U256::zero());
        s.insert((addr(1), key), StorageValue::ZERO);
        let mut state = StepState::from_cache(&a, &c, &s, &h);

        state
            .set_storage(addr(1), key, StorageValue::from_u256(U256::from(9)))
            .unwrap();
        assert_eq!(state.get_storage(addr(1), key).unwrap().to_u256(), U256::from(9));
    }

    #[test]
    fn test_block_hash_requires() {
        let (a, c, s, mut h) = empty_cache();
        h.insert(7, Hash::new([7u8; 32]));
        let mut state = StepState::from_cache(&a, &c, &s, &h);

        assert_eq!(state.get_block_hash(7).unwrap(), Hash::new([7u8; 32]));
        assert_eq!(
            state.get_block_hash(8),
            Err(VmError::Require(Require::BlockHash(8)))
        );
    }
}
