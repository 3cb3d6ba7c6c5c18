//! Hashing utilities for the ledger
//!
//! Provides the SHA-256 digest used for block hashes, transaction digests
//! and merkle tree nodes, plus the proof-of-work difficulty predicate.

use sha2::{Digest, Sha256};

/// Hash of "no predecessor": 64 zero hex characters
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes SHA-256 hash and returns it as a lowercase hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Number of leading `'0'` characters of a hex digest
pub fn leading_zero_chars(hash: &str) -> usize {
    hash.chars().take_while(|c| *c == '0').count()
}

/// Checks if a hex hash meets the difficulty target
/// The hash must start with `difficulty` zero hex characters
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    leading_zero_chars(hash) >= difficulty
}
