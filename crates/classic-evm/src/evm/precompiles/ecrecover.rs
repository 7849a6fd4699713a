//! # EcRecover Precompile (0x01)
//!
//! Recovers the signer address of an ECDSA signature over secp256k1.
//!
//! Input, zero-padded to 128 bytes: hash (32) | v (32) | r (32) | s (32).
//! The v word must be 27 or 28 with all upper bytes zero. Any invalid
//! input yields empty output, never an error.

use super::Precompile;
use crate::domain::services::address_from_pubkey;
use crate::errors::PrecompileError;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

/// Fixed gas cost.
const ECRECOVER_GAS: u64 = 3000;

/// The ecrecover precompile.
pub struct EcRecover;

impl Precompile for EcRecover {
    fn required_gas(&self, _input: &[u8]) -> u64 {
        ECRECOVER_GAS
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
        let mut padded = [0u8; 128];
        let len = input.len().min(128);
        padded[..len].copy_from_slice(&input[..len]);

        let hash = &padded[0..32];
        let v = &padded[32..64];

        // Strict v check: the word is 27 or 28, nothing else.
        if v[..31] != [0u8; 31] || (v[31] != 27 && v[31] != 28) {
            return Ok(Vec::new());
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&padded[64..96]);
        s.copy_from_slice(&padded[96..128]);

        // Scalars outside the subgroup (zero or >= the group order) are
        // rejected by the signature parser.
        let Ok(signature) = Signature::from_scalars(r, s) else {
            return Ok(Vec::new());
        };
        let Some(recovery_id) = RecoveryId::from_byte(v[31] - 27) else {
            return Ok(Vec::new());
        };
        let Ok(key) = VerifyingKey::recover_from_prehash(hash, &signature, recovery_id) else {
            return Ok(Vec::new());
        };

        // keccak256(uncompressed pubkey)[12..], left-padded to a word.
        let point = key.to_encoded_point(false);
        let address = address_from_pubkey(&point.as_bytes()[1..]);

        let mut output = vec![0u8; 32];
        output[12..].copy_from_slice(address.as_bytes());
        Ok(output)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // A signature produced with a known key: signing the keccak hash of
    // "classic" with secret key 0x01 recovers the address of generator
    // point G. Building the fixture at test time keeps the vector honest.
    fn fixture() -> ([u8; 128], Vec<u8>) {
        use k256::ecdsa::SigningKey;

        let secret = {
            let mut bytes = [0u8; 32];
            bytes[31] = 1;
            bytes
        };
        let signing_key = SigningKey::from_bytes(&secret.into()).unwrap();
        let prehash = crate::domain::services::keccak256(b"classic");

        let (signature, recovery_id) = signing_key
            .sign_prehash_recoverable(prehash.as_bytes())
            .unwrap();

        let mut input = [0u8; 128];
        input[0..32].copy_from_slice(prehash.as_bytes());
        input[63] = 27 + recovery_id.to_byte();
        input[64..96].copy_from_slice(signature.r().to_bytes().as_slice());
        input[96..128].copy_from_slice(signature.s().to_bytes().as_slice());

        let point = signing_key.verifying_key().to_encoded_point(false);
        let address = address_from_pubkey(&point.as_bytes()[1..]);
        let mut expected = vec![0u8; 32];
        expected[12..].copy_from_slice(address.as_bytes());

        (input, expected)
    }

    #[test]
    fn test_recovers_known_signer() {
        let (input, expected) = fixture();
        let output = EcRecover.run(&input).unwrap();
        assert_eq!(output, expected);
    }

    #[test]
    fn test_invalid_v_yields_empty() {
        let (mut input, _) = fixture();
        input[63] = 29;
        assert!(EcRecover.run(&input).unwrap().is_empty());

        // Garbage in the upper v bytes is rejected by the strict check.
        let (mut input, _) = fixture();
        input[40] = 1;
        assert!(EcRecover.run(&input).unwrap().is_empty());
    }

    #[test]
    fn test_zero_r_s_yields_empty() {
        let (mut input, _) = fixture();
        input[64..96].fill(0);
        assert!(EcRecover.run(&input).unwrap().is_empty());

        let (mut input, _) = fixture();
        input[96..128].fill(0);
        assert!(EcRecover.run(&input).unwrap().is_empty());
    }

    #[test]
    fn test_out_of_range_s_yields_empty() {
        let (mut input, _) = fixture();
        input[96..128].fill(0xFF); // far above the group order
        assert!(EcRecover.run(&input).unwrap().is_empty());
    }

    #[test]
    fn test_short_input_is_padded() {
        // All-zero (fully padded) input: v = 0 fails the check.
        assert!(EcRecover.run(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_gas_is_flat() {
        assert_eq!(EcRecover.required_gas(&[]), 3000);
        assert_eq!(EcRecover.required_gas(&[0u8; 1024]), 3000);
    }
}
