//! End-to-end execution tests driven by JSON fixtures: literal programs,
//! their expected outputs, gas bills and state effects.

mod common;

use classic_evm::prelude::*;
use common::{parse_address, run};

const CALLER: &str = "0x1111111111111111111111111111111111111111";
const CONTRACT: &str = "0x2222222222222222222222222222222222222222";
const CALLEE: &str = "0x0000000000000000000000000000000000001000";

/// A fixture calling `code` installed at CONTRACT with `gas`.
fn call_fixture(code: &str, gas: u64) -> String {
    call_fixture_with(code, gas, "0", &format!(r#""{CALLER}": {{"balance": "0", "nonce": "0", "code": "0x"}}"#))
}

fn call_fixture_with(code: &str, gas: u64, value: &str, extra_accounts: &str) -> String {
    format!(
        r#"{{
            "pre": {{
                {extra_accounts},
                "{CONTRACT}": {{"balance": "0", "nonce": "0", "code": "{code}"}}
            }},
            "block": {{
                "coinbase": "0x0000000000000000000000000000000000000000",
                "number": "100",
                "timestamp": "1500000000",
                "difficulty": "0x20000",
                "gasLimit": "10000000"
            }},
            "transaction": {{
                "caller": "{CALLER}",
                "to": "{CONTRACT}",
                "data": "0x",
                "gas": "{gas}",
                "gasPrice": "1",
                "value": "{value}",
                "nonce": "0"
            }}
        }}"#
    )
}

// =============================================================================
// LITERAL SCENARIOS
// =============================================================================

#[test]
fn identity_return_uses_21_gas() {
    common::init_tracing();
    // PUSH1 1, PUSH1 0, MSTORE, PUSH1 32, PUSH1 0, RETURN
    let fixture = call_fixture("0x600160005260206000f3", 100_000);
    let (result, _, gas) = run(&fixture, Fork::Atlantis);

    assert!(result.is_success());
    let mut expected = [0u8; 32];
    expected[31] = 1;
    assert_eq!(result.output.as_slice(), &expected);
    assert_eq!(result.gas_used(gas), 21);
}

#[test]
fn exp_with_25_gas_runs_dry() {
    // PUSH2 0xFFFF, PUSH1 32, EXP
    let fixture = call_fixture("0x61ffff60200a", 25);
    let (result, _, gas) = run(&fixture, Fork::Atlantis);

    assert_eq!(result.exit, ExitReason::Error(VmError::OutOfGas));
    assert_eq!(result.gas_used(gas), 25);
}

#[test]
fn jump_into_push_data_fails() {
    // PUSH1 1, JUMP: position 1 is immediate data of the PUSH.
    let fixture = call_fixture("0x600156", 50_000);
    let (result, _, gas) = run(&fixture, Fork::Atlantis);

    assert_eq!(
        result.exit,
        ExitReason::Error(VmError::InvalidJumpDestination(1))
    );
    assert_eq!(result.gas_used(gas), gas);
}

#[test]
fn value_call_without_balance_pushes_zero_and_leaves_state() {
    // PUSH1 0 x4, PUSH1 1, PUSH20 callee, PUSH2 0xFFFF, CALL, then the
    // status word is returned.
    let callee = CALLEE.trim_start_matches("0x");
    let code = format!("0x6000600060006000600173{callee}61ffff f160005260206000f3")
        .replace(' ', "");
    let fixture = call_fixture(&code, 200_000);
    let (result, mut state, _) = run(&fixture, Fork::Atlantis);

    assert!(result.is_success());
    assert_eq!(result.output.as_slice()[31], 0);
    // The callee never came into existence.
    assert!(!state.exists(parse_address(CALLEE)).unwrap());
}

#[test]
fn sstore_zero_to_nonzero_costs_20006() {
    // PUSH1 1, PUSH1 0, SSTORE
    let fixture = call_fixture("0x6001600055", 30_000);
    let (result, mut state, gas) = run(&fixture, Fork::Atlantis);

    assert!(result.is_success());
    assert_eq!(result.gas_used(gas), 20_000 + 3 + 3);
    let slot = state
        .get_storage(parse_address(CONTRACT), StorageKey::from_u256(U256::zero()))
        .unwrap();
    assert_eq!(slot.to_u256(), U256::one());
}

#[test]
fn revert_returns_data_and_remaining_gas() {
    // PUSH1 0x42, PUSH1 0, MSTORE, PUSH1 1, PUSH1 31, REVERT
    let fixture = call_fixture("0x60426000526001601ffd", 100_000);
    let (result, _, gas) = run(&fixture, Fork::Atlantis);

    assert_eq!(result.exit, ExitReason::Revert);
    assert!(!result.is_success());
    assert_eq!(result.output.as_slice(), &[0x42]);
    // Four pushes, MSTORE, REVERT, plus one memory word.
    assert_eq!(result.gas_used(gas), 12 + 3 + 3 + 3);
}

// =============================================================================
// UNIVERSAL PROPERTIES
// =============================================================================

#[test]
fn gas_usage_is_deterministic() {
    let fixture = call_fixture("0x600160005260206000f3", 77_777);
    let (first, _, gas) = run(&fixture, Fork::Atlantis);
    let (second, _, _) = run(&fixture, Fork::Atlantis);

    assert_eq!(first.gas_used(gas), second.gas_used(gas));
    assert_eq!(first.output, second.output);
}

#[test]
fn forwarded_gas_is_capped_at_63_64ths() {
    // The callee reports its own gas: GAS, PUSH1 0, MSTORE, RETURN word.
    let callee_code = "0x5a60005260206000f3";
    let callee = CALLEE.trim_start_matches("0x");
    // Request far more than available; the cap decides.
    let code =
        format!("0x60206000600060006000 73{callee} 62ffffff f1 60206000f3").replace(' ', "");
    let accounts = format!(
        r#""{CALLER}": {{"balance": "0", "nonce": "0", "code": "0x"}},
           "{CALLEE}": {{"balance": "0", "nonce": "1", "code": "{callee_code}"}}"#
    );
    let gas = 100_000u64;
    let fixture = call_fixture_with(&code, gas, "0", &accounts);
    let (result, _, _) = run(&fixture, Fork::Atlantis);
    assert!(result.is_success());

    // Seven pushes before CALL, base 700, one memory word for the out
    // region; the callee burned 2 on GAS before reporting.
    let available = gas - 7 * 3 - 700 - 3;
    let expected = (available - available / 64) - 2;
    let reported = U256::from_big_endian(&result.output.as_slice()[..32]);
    assert_eq!(reported, U256::from(expected));
}

#[test]
fn forwarded_gas_is_taken_literally_before_the_reprice() {
    let callee_code = "0x5a60005260206000f3";
    let callee = CALLEE.trim_start_matches("0x");
    // Request exactly 10000.
    let code =
        format!("0x60206000600060006000 73{callee} 612710 f1 60206000f3").replace(' ', "");
    let accounts = format!(
        r#""{CALLER}": {{"balance": "0", "nonce": "0", "code": "0x"}},
           "{CALLEE}": {{"balance": "0", "nonce": "1", "code": "{callee_code}"}}"#
    );
    let fixture = call_fixture_with(&code, 100_000, "0", &accounts);
    let (result, _, _) = run(&fixture, Fork::Homestead);
    assert!(result.is_success());

    let reported = U256::from_big_endian(&result.output.as_slice()[..32]);
    assert_eq!(reported, U256::from(10_000 - 2));
}

#[test]
fn memory_fee_equals_final_quadratic_cost() {
    // Two MSTOREs growing memory to one word, then three.
    let fixture = call_fixture("0x60016000526001604052", 50_000);
    let (result, _, gas) = run(&fixture, Fork::Atlantis);

    assert!(result.is_success());
    // 4 pushes + 2 MSTOREs + C(3) = 3*3 + 9/512 rounded down.
    let quadratic = 3 * 3 + (3 * 3) / 512;
    assert_eq!(result.gas_used(gas), 12 + 6 + quadratic);
}

#[test]
fn storage_clear_refunds_accumulate_per_slot() {
    // Clear slots 0 and 1, both holding non-zero values.
    let code = "0x60006000556000600155";
    let accounts = format!(
        r#""{CALLER}": {{"balance": "0", "nonce": "0", "code": "0x"}}"#
    );
    let fixture = format!(
        r#"{{
            "pre": {{
                {accounts},
                "{CONTRACT}": {{
                    "balance": "0", "nonce": "0", "code": "{code}",
                    "storage": {{"0x00": "0x01", "0x01": "0x02"}}
                }}
            }},
            "block": {{
                "coinbase": "0x0000000000000000000000000000000000000000",
                "number": "1", "timestamp": "1", "difficulty": "0x20000",
                "gasLimit": "10000000"
            }},
            "transaction": {{
                "caller": "{CALLER}", "to": "{CONTRACT}", "data": "0x",
                "gas": "100000", "gasPrice": "1", "value": "0", "nonce": "0"
            }}
        }}"#
    );
    let (result, _, _) = run(&fixture, Fork::Atlantis);

    assert!(result.is_success());
    assert_eq!(result.refund, 30_000);
    // Settlement caps the refund at half the gas used.
    let used = result.gas_used(100_000);
    assert_eq!(
        classic_evm::evm::gas::refund_cap(used, result.refund),
        used / 2
    );
}

#[test]
fn suicide_refund_is_granted_once_per_address() {
    let beneficiary = "0x00000000000000000000000000000000000000aa";
    let ben = beneficiary.trim_start_matches("0x");
    let callee = CALLEE.trim_start_matches("0x");
    // Callee self-destructs to the beneficiary.
    let callee_code = format!("0x73{ben}ff");
    // The contract calls it twice, popping each status.
    let call_seq = format!("60006000600060006000 73{callee} 61ffff f150");
    let code = format!("0x{call_seq}{call_seq}00").replace(' ', "");
    let accounts = format!(
        r#""{CALLER}": {{"balance": "0", "nonce": "0", "code": "0x"}},
           "{CALLEE}": {{"balance": "5", "nonce": "1", "code": "{callee_code}"}}"#
    );
    let fixture = call_fixture_with(&code, 500_000, "0", &accounts);
    let (result, mut state, _) = run(&fixture, Fork::Atlantis);

    assert!(result.is_success());
    assert_eq!(result.refund, 24_000);
    assert_eq!(
        state.get_balance(parse_address(beneficiary)).unwrap(),
        U256::from(5)
    );
    assert!(state.has_suicided(parse_address(CALLEE)).unwrap());
}

#[test]
fn blockhash_window_is_256_ancestors() {
    let previous = "0x00000000000000000000000000000000000000000000000000000000000000aa";
    // BLOCKHASH(99), RETURN word.
    let code = "0x60634060005260206000f3";
    let fixture = format!(
        r#"{{
            "pre": {{
                "{CALLER}": {{"balance": "0", "nonce": "0", "code": "0x"}},
                "{CONTRACT}": {{"balance": "0", "nonce": "0", "code": "{code}"}}
            }},
            "block": {{
                "coinbase": "0x0000000000000000000000000000000000000000",
                "number": "100", "timestamp": "1", "difficulty": "0x20000",
                "gasLimit": "10000000", "previousHash": "{previous}"
            }},
            "transaction": {{
                "caller": "{CALLER}", "to": "{CONTRACT}", "data": "0x",
                "gas": "100000", "gasPrice": "1", "value": "0", "nonce": "0"
            }}
        }}"#
    );
    let (result, _, _) = run(&fixture, Fork::Atlantis);
    assert!(result.is_success());
    assert_eq!(result.output.as_slice()[31], 0xaa);

    // The current block's own number reads as zero.
    let fixture = fixture.replace("0x6063", "0x6064");
    let (result, _, _) = run(&fixture, Fork::Atlantis);
    assert!(result.is_success());
    assert_eq!(result.output.as_slice(), &[0u8; 32]);
}

#[test]
fn identity_precompile_through_call() {
    // Put 0x42 in memory, call 0x04 on it, return the copied word.
    let identity = "0000000000000000000000000000000000000004";
    let code = format!(
        "0x6042600052 6020602060206000600073{identity}61ffff f1 60206020f3"
    )
    .replace(' ', "");
    let fixture = call_fixture(&code, 200_000);
    let (result, _, _) = run(&fixture, Fork::Atlantis);

    assert!(result.is_success());
    assert_eq!(result.output.len(), 32);
    assert_eq!(result.output.as_slice()[31], 0x42);
}

#[test]
fn reading_calldata_past_the_end_yields_zeros() {
    // CALLDATALOAD(2) over 3 bytes of calldata, return the word.
    let code = "0x60023560005260206000f3";
    let fixture = call_fixture(code, 100_000).replace(r#""data": "0x""#, r#""data": "0xaabbcc""#);
    let (result, _, _) = run(&fixture, Fork::Atlantis);

    assert!(result.is_success());
    // Byte 2 of calldata is 0xcc, everything after is zero padding.
    assert_eq!(result.output.as_slice()[0], 0xcc);
    assert_eq!(&result.output.as_slice()[1..], &[0u8; 31]);
}

#[test]
fn error_inside_frame_restores_the_address_set() {
    // The contract writes storage, then jumps nowhere.
    let code = "0x600160005560ff56";
    let fixture = call_fixture(code, 100_000);
    let (result, mut state, _) = run(&fixture, Fork::Atlantis);

    assert!(matches!(
        result.exit,
        ExitReason::Error(VmError::InvalidJumpDestination(_))
    ));
    // The SSTORE was rolled back with the frame.
    let slot = state
        .get_storage(parse_address(CONTRACT), StorageKey::from_u256(U256::zero()))
        .unwrap();
    assert_eq!(slot, StorageValue::ZERO);
    assert_eq!(result.refund, 0);
}
