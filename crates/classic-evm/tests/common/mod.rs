//! Shared fixture harness for the execution tests.
//!
//! Fixtures are JSON records: a `pre` state map, a `block` context and a
//! `transaction`, all hex- or decimal-encoded strings.

use classic_evm::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub pre: HashMap<String, RawAccount>,
    pub block: RawBlock,
    pub transaction: RawTransaction,
}

#[derive(Debug, Deserialize)]
pub struct RawAccount {
    pub balance: String,
    pub nonce: String,
    pub code: String,
    #[serde(default)]
    pub storage: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct RawBlock {
    pub coinbase: String,
    pub number: String,
    pub timestamp: String,
    pub difficulty: String,
    #[serde(rename = "gasLimit")]
    pub gas_limit: String,
    #[serde(rename = "previousHash", default)]
    pub previous_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawTransaction {
    pub caller: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    pub gas: String,
    #[serde(rename = "gasPrice")]
    pub gas_price: String,
    pub value: String,
    #[allow(dead_code)]
    pub nonce: String,
}

/// Opt-in interpreter traces: set RUST_LOG=classic_evm=trace.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn parse_u256(s: &str) -> U256 {
    match s.strip_prefix("0x") {
        Some(stripped) => U256::from_str_radix(stripped, 16).expect("hex number"),
        None => U256::from_dec_str(s).expect("decimal number"),
    }
}

pub fn parse_u64(s: &str) -> u64 {
    parse_u256(s).as_u64()
}

pub fn parse_bytes(s: &str) -> Vec<u8> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(stripped).expect("hex bytes")
}

pub fn parse_address(s: &str) -> Address {
    Address::from_slice(&parse_bytes(s)).expect("20-byte address")
}

pub fn parse_hash(s: &str) -> Hash {
    Hash::from_slice(&parse_bytes(s)).expect("32-byte hash")
}

pub fn load(json: &str) -> Fixture {
    serde_json::from_str(json).expect("well-formed fixture")
}

/// Builds the pre-state described by the fixture.
pub fn build_state(fixture: &Fixture) -> JournaledState {
    let mut state = JournaledState::new();

    for (addr, raw) in &fixture.pre {
        let address = parse_address(addr);
        state.seed_account(address);
        state.seed_balance(address, parse_u256(&raw.balance));
        state.seed_nonce(address, parse_u64(&raw.nonce));
        state.seed_code(address, Bytes::from_vec(parse_bytes(&raw.code)));
        for (key, value) in &raw.storage {
            state.seed_storage(
                address,
                StorageKey::from_u256(parse_u256(key)),
                StorageValue::from_u256(parse_u256(value)),
            );
        }
    }

    if let Some(hash) = &fixture.block.previous_hash {
        let number = parse_u64(&fixture.block.number);
        if number > 0 {
            state.seed_block_hash(number - 1, parse_hash(hash));
        }
    }

    state
}

/// Builds the execution environment described by the fixture.
pub fn build_env(fixture: &Fixture) -> Env {
    Env {
        origin: parse_address(&fixture.transaction.caller),
        gas_price: parse_u256(&fixture.transaction.gas_price),
        block: BlockContext {
            number: parse_u64(&fixture.block.number),
            timestamp: parse_u64(&fixture.block.timestamp),
            coinbase: parse_address(&fixture.block.coinbase),
            difficulty: parse_u256(&fixture.block.difficulty),
            gas_limit: parse_u64(&fixture.block.gas_limit),
        },
    }
}

/// Runs the fixture's transaction under `fork` and returns the result
/// together with the post-state.
pub fn run(json: &str, fork: Fork) -> (ExecutionResult, JournaledState, u64) {
    let fixture = load(json);
    let mut state = build_state(&fixture);
    let env = build_env(&fixture);

    let caller = parse_address(&fixture.transaction.caller);
    let data = Bytes::from_vec(
        fixture
            .transaction
            .data
            .as_deref()
            .map(parse_bytes)
            .unwrap_or_default(),
    );
    let gas = parse_u64(&fixture.transaction.gas);
    let value = parse_u256(&fixture.transaction.value);

    let result = {
        let mut evm = Evm::new(&mut state, env, fork);
        match &fixture.transaction.to {
            Some(to) => evm.call(caller, parse_address(to), data, gas, value),
            None => evm.create(caller, data, gas, value),
        }
    };
    (result, state, gas)
}
