//! Mining engine for the ledger
//!
//! Builds a candidate block (coinbase first, then pending transfers) on the
//! current tip and searches for a nonce. The search runs until it succeeds
//! or the caller cancels it.

use crate::core::{Amount, Block, Blockchain, ChainError, Transaction, BLOCK_REWARD};
use log::info;
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Mining errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MiningError {
    #[error("Mining cancelled")]
    MiningCancelled,
    #[error("Mined block rejected: {0}")]
    Chain(#[from] ChainError),
}

/// Mining statistics
#[derive(Debug, Clone, Serialize)]
pub struct MiningStats {
    /// Number of hash attempts
    pub hash_attempts: u64,
    /// Time taken in milliseconds
    pub time_ms: u128,
    /// Hash rate (hashes per second)
    pub hash_rate: f64,
}

impl MiningStats {
    fn measure(hash_attempts: u64, start: Instant) -> Self {
        let time_ms = start.elapsed().as_millis();
        let hash_rate = if time_ms > 0 {
            (hash_attempts as f64) / (time_ms as f64 / 1000.0)
        } else {
            hash_attempts as f64
        };

        Self {
            hash_attempts,
            time_ms,
            hash_rate,
        }
    }
}

/// Miner for creating new blocks
#[derive(Debug, Clone)]
pub struct Miner {
    /// Miner's address for receiving rewards
    pub address: String,
    /// Reward paid by the coinbase
    pub reward: Amount,
}

impl Miner {
    /// Create a new miner paid the default reward
    pub fn new(address: &str) -> Self {
        Self::with_reward(address, BLOCK_REWARD)
    }

    pub fn with_reward(address: &str, reward: Amount) -> Self {
        Self {
            address: address.to_string(),
            reward,
        }
    }

    /// Mine a new block with the given transactions and append it
    pub fn mine_block(
        &self,
        blockchain: &mut Blockchain,
        transactions: Vec<Transaction>,
        cancel: &CancellationToken,
    ) -> Result<(Block, MiningStats), MiningError> {
        let (block, stats) = self.mine_block_detached(
            blockchain.tip(),
            blockchain.difficulty,
            transactions,
            cancel,
        )?;

        blockchain.append(block.clone())?;
        Ok((block, stats))
    }

    /// Mine a block on top of `parent` without touching any chain
    ///
    /// The nonce search is the expensive part; callers can run it without
    /// holding a chain lock and append the result afterwards.
    pub fn mine_block_detached(
        &self,
        parent: &Block,
        difficulty: usize,
        transactions: Vec<Transaction>,
        cancel: &CancellationToken,
    ) -> Result<(Block, MiningStats), MiningError> {
        let start = Instant::now();

        let mut all_transactions = vec![Transaction::coinbase(&self.address, self.reward)];
        all_transactions.extend(transactions);

        let mut block = Block::new(parent.index + 1, parent.hash.clone(), all_transactions);

        info!(
            "Mining block {} with difficulty {} ({} transactions)...",
            block.index,
            difficulty,
            block.tx_count()
        );

        let attempts = match block.mine(difficulty, cancel) {
            Some(attempts) => attempts,
            None => {
                info!("Mining of block {} cancelled", block.index);
                return Err(MiningError::MiningCancelled);
            }
        };

        let stats = MiningStats::measure(attempts, start);

        info!(
            "Block {} mined in {}ms ({} attempts, {:.2} H/s)",
            block.index, stats.time_ms, attempts, stats.hash_rate
        );

        Ok((block, stats))
    }
}
