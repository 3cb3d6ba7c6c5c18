//! Merkle root over transaction digests
//!
//! Leaves are hex digests. Each level hashes the concatenation of two
//! neighbouring hex strings; an odd node out is paired with itself.

use super::hash::sha256_hex;

/// Calculate the merkle root from a list of hex-encoded leaf hashes
pub fn merkle_root(leaves: &[String]) -> String {
    if leaves.is_empty() {
        return sha256_hex(b"");
    }

    let mut level: Vec<String> = leaves.to_vec();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                sha256_hex(format!("{}{}", left, right).as_bytes())
            })
            .collect();
    }

    level.remove(0)
}
