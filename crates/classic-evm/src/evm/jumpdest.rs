//! # JUMPDEST Analysis
//!
//! A jump target is valid iff the byte there is JUMPDEST (0x5b) and it is
//! not immediate data of a PUSH. The bitmap is computed once per code
//! identity and shared read-only between frames running the same code.

use crate::domain::value_objects::Hash;
use std::collections::HashMap;
use std::sync::Arc;

const JUMPDEST: u8 = 0x5B;
const PUSH1: u8 = 0x60;
const PUSH32: u8 = 0x7F;

// =============================================================================
// CODE BITMAP
// =============================================================================

/// One bit per code position, set where a jump may land.
#[derive(Debug)]
pub struct CodeBitmap {
    bits: Vec<u64>,
}

impl CodeBitmap {
    /// Scans `code` left to right, skipping PUSH immediates.
    #[must_use]
    pub fn analyze(code: &[u8]) -> Self {
        let mut bits = vec![0u64; code.len().div_ceil(64)];
        let mut pc = 0;
        while pc < code.len() {
            let op = code[pc];
            if op == JUMPDEST {
                bits[pc / 64] |= 1 << (pc % 64);
            } else if (PUSH1..=PUSH32).contains(&op) {
                pc += (op - PUSH1 + 1) as usize;
            }
            pc += 1;
        }
        Self { bits }
    }

    /// True when `position` is a valid jump destination.
    #[must_use]
    pub fn is_valid(&self, position: usize) -> bool {
        self.bits
            .get(position / 64)
            .is_some_and(|word| word & (1 << (position % 64)) != 0)
    }
}

// =============================================================================
// CACHE
// =============================================================================

/// Bitmaps keyed by code hash, shared across frames and calls.
#[derive(Debug, Default)]
pub struct JumpDestCache {
    maps: HashMap<Hash, Arc<CodeBitmap>>,
}

impl JumpDestCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bitmap for `code_hash`, analyzing `code` on first use.
    pub fn get(&mut self, code_hash: Hash, code: &[u8]) -> Arc<CodeBitmap> {
        self.maps
            .entry(code_hash)
            .or_insert_with(|| Arc::new(CodeBitmap::analyze(code)))
            .clone()
    }
}

// =============================================================================
// TESTS
// =============================================================================
