//! Transaction model for the ledger
//!
//! An account-style transfer: who pays, who receives, and how much.
//! There are no inputs, outputs or signatures; the sender field is trusted.

use crate::crypto::sha256_hex;
use serde::{Deserialize, Serialize};

/// Reserved sender that marks a block reward
pub const COINBASE: &str = "COINBASE";

/// Account identifier (the dashboard uses plain names like `Alice`)
pub type Address = String;

/// Transfer amount; always positive and finite inside a valid transaction
pub type Amount = f64;

/// Non-blank and not the reserved `COINBASE` marker
pub fn is_valid_address(address: &str) -> bool {
    !address.trim().is_empty() && address != COINBASE
}

/// A single transfer between two addresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Paying address, or `COINBASE` for a block reward
    pub sender: Address,
    /// Receiving address
    pub recipient: Address,
    /// Amount moved from sender to recipient
    pub amount: Amount,
}

impl Transaction {
    /// Create a regular transfer
    pub fn new(sender: &str, recipient: &str, amount: Amount) -> Self {
        Self {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            amount,
        }
    }

    /// Create a block reward paying `recipient`
    pub fn coinbase(recipient: &str, reward: Amount) -> Self {
        Self::new(COINBASE, recipient, reward)
    }

    /// Whether this transaction is a block reward
    pub fn is_coinbase(&self) -> bool {
        self.sender == COINBASE
    }

    /// Deterministic digest of the canonical JSON encoding, used as a merkle leaf
    pub fn digest(&self) -> String {
        let encoded = serde_json::to_string(self).unwrap_or_default();
        sha256_hex(encoded.as_bytes())
    }

    /// Amount is strictly positive and finite
    pub fn has_valid_amount(&self) -> bool {
        self.amount.is_finite() && self.amount > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coinbase() {
        let tx = Transaction::coinbase("miner", 50.0);
        assert!(tx.is_coinbase());
        assert_eq!(tx.recipient, "miner");
        assert_eq!(tx.amount, 50.0);
    }

    #[test]
    fn test_regular_transfer_is_not_coinbase() {
        let tx = Transaction::new("Alice", "Bob", 10.0);
        assert!(!tx.is_coinbase());
        assert!(tx.has_valid_amount());
    }

    #[test]
    fn test_amount_validity() {
        assert!(!Transaction::new("a", "b", 0.0).has_valid_amount());
        assert!(!Transaction::new("a", "b", -1.0).has_valid_amount());
        assert!(!Transaction::new("a", "b", f64::NAN).has_valid_amount());
        assert!(!Transaction::new("a", "b", f64::INFINITY).has_valid_amount());
        assert!(Transaction::new("a", "b", 0.5).has_valid_amount());
    }

    #[test]
    fn test_address_validity() {
        assert!(is_valid_address("Alice"));
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("   "));
        assert!(!is_valid_address(COINBASE));
    }

    #[test]
    fn test_digest_is_deterministic_and_content_bound() {
        let tx = Transaction::new("Alice", "Bob", 10.0);
        assert_eq!(tx.digest(), tx.clone().digest());
        assert_eq!(tx.digest().len(), 64);

        let changed = Transaction::new("Alice", "Mallory", 10.0);
        assert_ne!(tx.digest(), changed.digest());
    }

    #[test]
    fn test_wire_shape() {
        let tx = Transaction::new("Miner", "Alice", 20.0);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["sender"], "Miner");
        assert_eq!(json["recipient"], "Alice");
        assert_eq!(json["amount"], 20.0);
    }
}
