//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 hashing
//! - The leading-zero difficulty predicate
//! - Merkle root calculation

pub mod hash;
pub mod merkle;

pub use hash::{leading_zero_chars, meets_difficulty, sha256, sha256_hex, ZERO_HASH};
pub use merkle::merkle_root;
