//! # ModExp Precompile (0x05)
//!
//! Arbitrary-precision modular exponentiation, Atlantis onward.
//!
//! Input: three 32-byte big-endian length prefixes (base, exponent,
//! modulus) followed by the three values. Reads past the end of the input
//! see zeros; the result is left-padded to the modulus length.

use super::Precompile;
use crate::errors::PrecompileError;
use num_bigint::BigUint;
use num_traits::Zero;
use primitive_types::U256;

/// Divisor of the quadratic complexity term.
const QUAD_DIVISOR: u64 = 20;

/// Cost cap: anything above is unpayable anyway.
const GAS_CAP: u64 = i64::MAX as u64;

/// The big-integer modular exponentiation precompile.
pub struct BigModExp;

impl Precompile for BigModExp {
    fn required_gas(&self, input: &[u8]) -> u64 {
        let base_len = read_length(input, 0);
        let exp_len = read_length(input, 32);
        let mod_len = read_length(input, 64);

        let (Some(base_len), Some(exp_len), Some(mod_len)) = (base_len, exp_len, mod_len) else {
            return GAS_CAP;
        };

        // Head bytes of the exponent drive the adjusted length.
        let exp_head = {
            let offset = 96 + base_len;
            let head_len = exp_len.min(32);
            BigUint::from_bytes_be(&read_padded(input, offset, head_len))
        };
        let adjusted = adjusted_exponent_length(exp_len as u64, &exp_head);

        let complexity = mult_complexity(base_len.max(mod_len) as u64);
        let gas = complexity
            .saturating_mul(u128::from(adjusted.max(1)))
            / u128::from(QUAD_DIVISOR);
        u64::try_from(gas).unwrap_or(GAS_CAP).min(GAS_CAP)
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
        let base_len =
            read_length(input, 0).ok_or(PrecompileError::InvalidInput("modexp base length"))?;
        let exp_len =
            read_length(input, 32).ok_or(PrecompileError::InvalidInput("modexp exp length"))?;
        let mod_len =
            read_length(input, 64).ok_or(PrecompileError::InvalidInput("modexp mod length"))?;

        if mod_len == 0 {
            return Ok(Vec::new());
        }

        let base = BigUint::from_bytes_be(&read_padded(input, 96, base_len));
        let exponent = BigUint::from_bytes_be(&read_padded(input, 96 + base_len, exp_len));
        let modulus = BigUint::from_bytes_be(&read_padded(
            input,
            96 + base_len + exp_len,
            mod_len,
        ));

        let result = if modulus.is_zero() {
            BigUint::zero()
        } else {
            base.modpow(&exponent, &modulus)
        };

        // Left-pad to the modulus length.
        let bytes = result.to_bytes_be();
        let mut output = vec![0u8; mod_len];
        output[mod_len - bytes.len()..].copy_from_slice(&bytes);
        Ok(output)
    }
}

/// One 32-byte length prefix as usize; None when it is impossibly large.
fn read_length(input: &[u8], offset: usize) -> Option<usize> {
    let word = U256::from_big_endian(&read_padded(input, offset, 32));
    if word > U256::from(u32::MAX) {
        return None;
    }
    Some(word.as_usize())
}

/// `len` bytes at `offset`, zero-extended past the end of the input.
fn read_padded(input: &[u8], offset: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    if offset < input.len() {
        let end = (offset + len).min(input.len());
        out[..end - offset].copy_from_slice(&input[offset..end]);
    }
    out
}

/// Adjusted exponent length per the piecewise rule: small exponents count
/// their highest set bit, oversized ones pay 8 gas-bits per extra byte.
fn adjusted_exponent_length(exp_len: u64, head: &BigUint) -> u64 {
    let head_bits = if head.is_zero() { 0 } else { head.bits() - 1 };
    if exp_len <= 32 {
        head_bits
    } else {
        8 * (exp_len - 32) + head_bits
    }
}

/// The piecewise multiplication complexity polynomial.
fn mult_complexity(x: u64) -> u128 {
    let x = u128::from(x);
    if x <= 64 {
        x * x
    } else if x <= 1024 {
        x * x / 4 + 96 * x - 3072
    } else {
        x * x / 16 + 480 * x - 199_680
    }
}

// =============================================================================
// TESTS
// =============================================================================
