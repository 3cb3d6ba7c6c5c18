//! Block implementation for the ledger
//!
//! A block commits to its position, its predecessor, its transactions (via
//! the merkle root) and a proof-of-work nonce.

use crate::core::transaction::Transaction;
use crate::crypto::{meets_difficulty, merkle_root, sha256_hex, ZERO_HASH};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Unix time of the fixed genesis block
pub const GENESIS_TIMESTAMP: i64 = 0;

/// Nonces tried between two looks at the cancellation token
pub const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// A block in the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block index/height
    pub index: u64,
    /// Creation time, carried on the wire as unix seconds
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    /// Hash of the previous block
    pub previous_hash: String,
    /// Merkle root of all transactions
    pub merkle_root: String,
    /// Ordered transactions, coinbase first
    pub transactions: Vec<Transaction>,
    /// Nonce used for proof of work
    pub nonce: u64,
    /// Block hash (cached)
    pub hash: String,
}

impl Block {
    /// Create a new block (unmined)
    pub fn new(index: u64, previous_hash: String, transactions: Vec<Transaction>) -> Self {
        Self::with_timestamp(index, Utc::now(), previous_hash, transactions)
    }

    fn with_timestamp(
        index: u64,
        timestamp: DateTime<Utc>,
        previous_hash: String,
        transactions: Vec<Transaction>,
    ) -> Self {
        let merkle_root = Self::calculate_merkle_root(&transactions);

        let mut block = Self {
            index,
            timestamp,
            previous_hash,
            merkle_root,
            transactions,
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// The fixed genesis block for a difficulty
    ///
    /// Every input is constant, so two chains with the same difficulty
    /// always agree on block 0.
    pub fn genesis(difficulty: usize) -> Self {
        let timestamp = DateTime::from_timestamp(GENESIS_TIMESTAMP, 0).unwrap_or_default();
        let mut block = Self::with_timestamp(0, timestamp, ZERO_HASH.to_string(), Vec::new());

        // never cancelled
        let _ = block.mine(difficulty, &CancellationToken::new());
        block
    }

    /// Calculate the merkle root from transactions
    fn calculate_merkle_root(transactions: &[Transaction]) -> String {
        let leaves: Vec<String> = transactions.iter().map(Transaction::digest).collect();
        merkle_root(&leaves)
    }

    /// Hash over index, timestamp, previous hash, merkle root of the
    /// current transactions, and nonce
    pub fn calculate_hash(&self) -> String {
        let data = format!(
            "{}|{}|{}|{}|{}",
            self.index,
            self.timestamp.timestamp(),
            self.previous_hash,
            Self::calculate_merkle_root(&self.transactions),
            self.nonce
        );
        sha256_hex(data.as_bytes())
    }

    /// Search nonces from 0 upward until the hash meets `difficulty`
    ///
    /// Returns the number of attempts, or `None` once `cancel` fires.
    pub fn mine(&mut self, difficulty: usize, cancel: &CancellationToken) -> Option<u64> {
        self.mine_from(0, difficulty, cancel)
    }

    fn mine_from(
        &mut self,
        start: u64,
        difficulty: usize,
        cancel: &CancellationToken,
    ) -> Option<u64> {
        // merkle root is fixed for the whole search
        let mut prefix = self.header_prefix();
        let mut nonce = start;
        let mut attempts = 0u64;

        loop {
            if attempts % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return None;
            }

            let hash = sha256_hex(format!("{}{}", prefix, nonce).as_bytes());
            attempts = attempts.saturating_add(1);
            if meets_difficulty(&hash, difficulty) {
                self.nonce = nonce;
                self.hash = hash;
                return Some(attempts);
            }

            nonce = match nonce.checked_add(1) {
                Some(next) => next,
                None => {
                    // nonce space exhausted: move the timestamp and start over
                    self.timestamp += TimeDelta::seconds(1);
                    log::debug!(
                        "Block {} exhausted its nonces, timestamp now {}",
                        self.index,
                        self.timestamp.timestamp()
                    );
                    prefix = self.header_prefix();
                    0
                }
            };
        }
    }

    fn header_prefix(&self) -> String {
        format!(
            "{}|{}|{}|{}|",
            self.index,
            self.timestamp.timestamp(),
            self.previous_hash,
            self.merkle_root
        )
    }

    /// Check if the proof of work is valid
    pub fn is_valid_pow(&self, difficulty: usize) -> bool {
        meets_difficulty(&self.hash, difficulty)
    }

    /// Verify the block's merkle root
    pub fn verify_merkle_root(&self) -> bool {
        Self::calculate_merkle_root(&self.transactions) == self.merkle_root
    }

    /// Verify the block hash
    pub fn verify_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    /// At most one coinbase, and only in first position
    pub fn has_valid_coinbase_placement(&self) -> bool {
        self.transactions
            .iter()
            .enumerate()
            .all(|(position, tx)| position == 0 || !tx.is_coinbase())
    }

    /// Get the coinbase transaction (first transaction)
    pub fn coinbase_tx(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }

    /// Get the mining reward from this block
    pub fn mining_reward(&self) -> f64 {
        self.coinbase_tx().map(|tx| tx.amount).unwrap_or(0.0)
    }

    /// Get number of transactions in this block
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}
