//! # Fork Gating
//!
//! Named rule-set changes on the Ethereum Classic chain, the gas schedules
//! they select, and the derived feature flags the interpreter consults.

use serde::{Deserialize, Serialize};

// =============================================================================
// FORK
// =============================================================================

/// A point on the chain at which the rules change. Ordered: every fork
/// includes the rules of the forks before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Fork {
    /// The launch rule set.
    Frontier,
    /// Adds DELEGATECALL; CREATE deposit-cost failure becomes fatal.
    Homestead,
    /// The gas reprice fork (Die Hard): EIP-150 cost increases and the
    /// 63/64 call-gas forwarding rule, EIP-160 EXP repricing.
    Eip150,
    /// Adds REVERT, RETURNDATASIZE, RETURNDATACOPY, STATICCALL, the modexp
    /// and bn256 precompiles, and the empty-account surcharge rule.
    #[default]
    Atlantis,
    /// Adds SHL, SHR, SAR, EXTCODEHASH and CREATE2.
    Later,
}

// =============================================================================
// GAS SCHEDULE
// =============================================================================

/// Fork-dependent gas constants.
///
/// `create_by_suicide` doubles as the EIP-150 marker: when it is set, the
/// 63/64 forwarding rule applies to calls and creates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasSchedule {
    /// EXTCODESIZE.
    pub ext_code_size: u64,
    /// EXTCODECOPY, before the per-word copy fee.
    pub ext_code_copy: u64,
    /// EXTCODEHASH (Later forks).
    pub ext_code_hash: u64,
    /// BALANCE.
    pub balance: u64,
    /// SLOAD.
    pub sload: u64,
    /// CALL/CALLCODE/DELEGATECALL/STATICCALL, before surcharges.
    pub call: u64,
    /// SELFDESTRUCT base cost.
    pub suicide: u64,
    /// Per-byte fee on the EXP exponent.
    pub exp_byte: u64,
    /// Surcharge when SELFDESTRUCT sends the balance to an account that
    /// must be created. Present from EIP-150 onward; also gates the 63/64
    /// forwarding rule.
    pub create_by_suicide: Option<u64>,
}

impl GasSchedule {
    /// Schedule in force up to and including Homestead.
    pub const HOMESTEAD: Self = Self {
        ext_code_size: 20,
        ext_code_copy: 20,
        ext_code_hash: 400,
        balance: 20,
        sload: 50,
        call: 40,
        suicide: 0,
        exp_byte: 10,
        create_by_suicide: None,
    };

    /// Schedule from the EIP-150 gas reprice onward.
    pub const EIP150: Self = Self {
        ext_code_size: 700,
        ext_code_copy: 700,
        ext_code_hash: 400,
        balance: 400,
        sload: 200,
        call: 700,
        suicide: 5000,
        exp_byte: 50,
        create_by_suicide: Some(25_000),
    };

    /// Selects the schedule for a fork.
    #[must_use]
    pub fn for_fork(fork: Fork) -> Self {
        if fork >= Fork::Eip150 {
            Self::EIP150
        } else {
            Self::HOMESTEAD
        }
    }

    /// True when the 63/64 call-gas forwarding rule applies.
    #[must_use]
    pub fn forwards_sixty_fourths(&self) -> bool {
        self.create_by_suicide.is_some()
    }
}

// =============================================================================
// FORK CONFIG
// =============================================================================

/// The fork together with everything derived from it. Built once per
/// execution, consulted by the gas calculator and the instruction table.
#[derive(Clone, Copy, Debug)]
pub struct ForkConfig {
    /// The selected fork.
    pub fork: Fork,
    /// Homestead rules active (DELEGATECALL, fatal deposit failure).
    pub homestead: bool,
    /// EIP-150 rules active (repriced state ops, 63/64 forwarding).
    pub eip150: bool,
    /// Atlantis rules active (REVERT family, new precompiles, empty-account
    /// surcharge, write protection, deployed-code size cap).
    pub atlantis: bool,
    /// Net-metered SSTORE (EIP-1283). Off for every named fork; hosts may
    /// opt in explicitly.
    pub eip1283: bool,
    /// The gas schedule in force.
    pub schedule: GasSchedule,
}

impl ForkConfig {
    /// Derives the configuration for a fork.
    #[must_use]
    pub fn new(fork: Fork) -> Self {
        Self {
            fork,
            homestead: fork >= Fork::Homestead,
            eip150: fork >= Fork::Eip150,
            atlantis: fork >= Fork::Atlantis,
            eip1283: false,
            schedule: GasSchedule::for_fork(fork),
        }
    }
}

impl From<Fork> for ForkConfig {
    fn from(fork: Fork) -> Self {
        Self::new(fork)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fork_ordering() {
        assert!(Fork::Frontier < Fork::Homestead);
        assert!(Fork::Homestead < Fork::Eip150);
        assert!(Fork::Eip150 < Fork::Atlantis);
        assert!(Fork::Atlantis < Fork::Later);
    }

    #[test]
    fn test_schedule_selection() {
        assert_eq!(GasSchedule::for_fork(Fork::Frontier).call, 40);
        assert_eq!(GasSchedule::for_fork(Fork::Homestead).sload, 50);
        assert_eq!(GasSchedule::for_fork(Fork::Eip150).call, 700);
        assert_eq!(GasSchedule::for_fork(Fork::Atlantis).suicide, 5000);
        assert!(GasSchedule::for_fork(Fork::Later).forwards_sixty_fourths());
        assert!(!GasSchedule::for_fork(Fork::Homestead).forwards_sixty_fourths());
    }

    #[test]
    fn test_fork_config_flags() {
        let config = ForkConfig::new(Fork::Frontier);
        assert!(!config.homestead && !config.eip150 && !config.atlantis);

        let config = ForkConfig::new(Fork::Eip150);
        assert!(config.homestead && config.eip150 && !config.atlantis);

        let config = ForkConfig::new(Fork::Atlantis);
        assert!(config.atlantis);
        assert!(!config.eip1283);
    }
}
