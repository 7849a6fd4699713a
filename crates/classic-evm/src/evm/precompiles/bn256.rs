//! # bn256 Precompiles (0x06, 0x07, 0x08)
//!
//! Point addition, scalar multiplication and the pairing check on the
//! alt_bn128 curve, Atlantis onward. Points are encoded as 32-byte
//! big-endian coordinates; (0, 0) is the point at infinity.

use super::Precompile;
use crate::errors::PrecompileError;
use bn::{pairing_batch, AffineG1, AffineG2, Fq, Fq2, Fr, Group, Gt, G1, G2};

const BN256_ADD_GAS: u64 = 500;
const BN256_SCALAR_MUL_GAS: u64 = 40_000;
const BN256_PAIRING_BASE_GAS: u64 = 100_000;
const BN256_PAIRING_POINT_GAS: u64 = 80_000;

/// Bytes per (G1, G2) pair in the pairing input.
const PAIR_SIZE: usize = 192;

/// Reads a field element.
fn read_fq(input: &[u8]) -> Result<Fq, PrecompileError> {
    Fq::from_slice(&input[..32]).map_err(|_| PrecompileError::InvalidInput("bn256 field element"))
}

/// Reads a G1 point from 64 bytes, accepting (0, 0) as infinity.
fn read_g1(input: &[u8]) -> Result<G1, PrecompileError> {
    let x = read_fq(&input[0..32])?;
    let y = read_fq(&input[32..64])?;
    if x == Fq::zero() && y == Fq::zero() {
        Ok(G1::zero())
    } else {
        AffineG1::new(x, y)
            .map(Into::into)
            .map_err(|_| PrecompileError::InvalidInput("bn256 point not on curve"))
    }
}

/// Reads a G2 point from 128 bytes: x and y as (imaginary, real) pairs.
fn read_g2(input: &[u8]) -> Result<G2, PrecompileError> {
    let x_im = read_fq(&input[0..32])?;
    let x_re = read_fq(&input[32..64])?;
    let y_im = read_fq(&input[64..96])?;
    let y_re = read_fq(&input[96..128])?;

    let x = Fq2::new(x_re, x_im);
    let y = Fq2::new(y_re, y_im);
    if x == Fq2::zero() && y == Fq2::zero() {
        Ok(G2::zero())
    } else {
        AffineG2::new(x, y)
            .map(Into::into)
            .map_err(|_| PrecompileError::InvalidInput("bn256 twist point not on curve"))
    }
}

/// Serialises a G1 point to 64 bytes; infinity becomes all zeros.
fn write_g1(point: G1) -> Vec<u8> {
    let mut output = vec![0u8; 64];
    if let Some(affine) = AffineG1::from_jacobian(point) {
        // Writing into 32-byte buffers cannot fail.
        let _ = affine.x().to_big_endian(&mut output[0..32]);
        let _ = affine.y().to_big_endian(&mut output[32..64]);
    }
    output
}

/// Zero-extends the input to `len` bytes.
fn padded(input: &[u8], len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    let copy = input.len().min(len);
    out[..copy].copy_from_slice(&input[..copy]);
    out
}

// =============================================================================
// ADD
// =============================================================================

/// Point addition on G1.
pub struct Bn256Add;

impl Precompile for Bn256Add {
    fn required_gas(&self, _input: &[u8]) -> u64 {
        BN256_ADD_GAS
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
        let input = padded(input, 128);
        let a = read_g1(&input[0..64])?;
        let b = read_g1(&input[64..128])?;
        Ok(write_g1(a + b))
    }
}

// =============================================================================
// SCALAR MUL
// =============================================================================

/// Scalar multiplication on G1.
pub struct Bn256ScalarMul;

impl Precompile for Bn256ScalarMul {
    fn required_gas(&self, _input: &[u8]) -> u64 {
        BN256_SCALAR_MUL_GAS
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
        let input = padded(input, 96);
        let point = read_g1(&input[0..64])?;
        let scalar = Fr::from_slice(&input[64..96])
            .map_err(|_| PrecompileError::InvalidInput("bn256 scalar"))?;
        Ok(write_g1(point * scalar))
    }
}

// =============================================================================
// PAIRING
// =============================================================================

/// The multi-pairing check: outputs a 32-byte 1 when the product of
/// pairings is the identity, 32-byte 0 otherwise.
pub struct Bn256Pairing;

impl Precompile for Bn256Pairing {
    fn required_gas(&self, input: &[u8]) -> u64 {
        BN256_PAIRING_BASE_GAS + BN256_PAIRING_POINT_GAS * (input.len() / PAIR_SIZE) as u64
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
        if input.len() % PAIR_SIZE != 0 {
            return Err(PrecompileError::InvalidInput(
                "bn256 pairing input not a multiple of 192",
            ));
        }

        let mut pairs = Vec::with_capacity(input.len() / PAIR_SIZE);
        for chunk in input.chunks_exact(PAIR_SIZE) {
            let g1 = read_g1(&chunk[0..64])?;
            let g2 = read_g2(&chunk[64..192])?;
            pairs.push((g1, g2));
        }

        let satisfied = pairing_batch(&pairs) == Gt::one();
        let mut output = vec![0u8; 32];
        if satisfied {
            output[31] = 1;
        }
        Ok(output)
    }
}

// =============================================================================
// TESTS
// =============================================================================
