//! Blockchain implementation
//!
//! The canonical chain of blocks and the balance projection derived from it.

use crate::core::block::Block;
use crate::core::transaction::{is_valid_address, Amount, Transaction};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Default mining difficulty (number of leading zero hex characters)
pub const DEFAULT_DIFFICULTY: usize = 3;

/// Hex characters in a SHA-256 digest; no hash can have more leading zeros
pub const MAX_DIFFICULTY: usize = 64;

/// Block reward in coins
pub const BLOCK_REWARD: Amount = 50.0;

/// Chain integrity errors
///
/// Any of these discards the candidate that raised it; the canonical chain
/// is never touched by a block or branch that fails validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("Chain has no blocks")]
    EmptyChain,
    #[error("Block 0 is not the genesis block")]
    BadGenesis,
    #[error("Broken link at block {index}: does not extend its predecessor")]
    BrokenLink { index: u64 },
    #[error("Hash mismatch at block {index}: contents do not match the stored hash")]
    HashMismatch { index: u64 },
    #[error("Invalid proof of work at block {index}")]
    BadProofOfWork { index: u64 },
    #[error("Misplaced or repeated coinbase at block {index}")]
    MultipleCoinbase { index: u64 },
    #[error("Coinbase at block {index} pays {found}, expected {expected}")]
    BadReward {
        index: u64,
        expected: Amount,
        found: Amount,
    },
    #[error("Invalid transaction {position} in block {index}")]
    InvalidTransaction { index: u64, position: usize },
    #[error("Candidate chain is not longer: {candidate} blocks vs {canonical} canonical")]
    ChainNotLonger { candidate: usize, canonical: usize },
}

/// Check `block` as the direct successor of `previous`
///
/// Besides linkage and proof of work, every transfer must move a positive
/// amount between two distinct addresses, and a coinbase must pay exactly
/// `reward` to a real address.
pub fn validate_successor(
    previous: &Block,
    block: &Block,
    difficulty: usize,
    reward: Amount,
) -> Result<(), ChainError> {
    let index = block.index;

    if index != previous.index + 1 || block.previous_hash != previous.hash {
        return Err(ChainError::BrokenLink { index });
    }

    if !block.verify_merkle_root() || !block.verify_hash() {
        return Err(ChainError::HashMismatch { index });
    }

    if !block.is_valid_pow(difficulty) {
        return Err(ChainError::BadProofOfWork { index });
    }

    if !block.has_valid_coinbase_placement() {
        return Err(ChainError::MultipleCoinbase { index });
    }

    for (position, tx) in block.transactions.iter().enumerate() {
        if tx.is_coinbase() {
            if tx.amount != reward {
                return Err(ChainError::BadReward {
                    index,
                    expected: reward,
                    found: tx.amount,
                });
            }
            if !is_valid_address(&tx.recipient) {
                return Err(ChainError::InvalidTransaction { index, position });
            }
        } else if !is_well_formed_transfer(tx) {
            return Err(ChainError::InvalidTransaction { index, position });
        }
    }

    Ok(())
}

fn is_well_formed_transfer(tx: &Transaction) -> bool {
    tx.has_valid_amount()
        && is_valid_address(&tx.sender)
        && is_valid_address(&tx.recipient)
        && tx.sender != tx.recipient
}

/// Validate a whole chain, front to back
pub fn validate_chain(
    blocks: &[Block],
    difficulty: usize,
    reward: Amount,
) -> Result<(), ChainError> {
    let genesis = blocks.first().ok_or(ChainError::EmptyChain)?;
    if *genesis != Block::genesis(difficulty) {
        return Err(ChainError::BadGenesis);
    }

    for pair in blocks.windows(2) {
        validate_successor(&pair[0], &pair[1], difficulty, reward)?;
    }

    Ok(())
}

/// Fold transactions into address -> signed balance
///
/// Coinbase rewards credit the recipient without debiting anyone.
pub fn fold_balances<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> BTreeMap<String, Amount> {
    let mut balances = BTreeMap::new();

    for tx in transactions {
        if !tx.is_coinbase() {
            *balances.entry(tx.sender.clone()).or_insert(0.0) -= tx.amount;
        }
        *balances.entry(tx.recipient.clone()).or_insert(0.0) += tx.amount;
    }

    balances
}

/// The canonical chain
#[derive(Debug, Clone)]
pub struct Blockchain {
    /// The chain of blocks
    blocks: Vec<Block>,
    /// Mining difficulty
    pub difficulty: usize,
    /// Amount every coinbase must pay
    pub reward: Amount,
}

impl Blockchain {
    /// Create a new blockchain with genesis block
    pub fn new() -> Self {
        Self::with_difficulty(DEFAULT_DIFFICULTY)
    }

    /// Create a blockchain with custom difficulty
    pub fn with_difficulty(difficulty: usize) -> Self {
        Self::with_params(difficulty, BLOCK_REWARD)
    }

    /// Create a blockchain with custom difficulty and block reward
    pub fn with_params(difficulty: usize, reward: Amount) -> Self {
        Self {
            blocks: vec![Block::genesis(difficulty)],
            difficulty,
            reward,
        }
    }

    /// All blocks, genesis first
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Get the latest block
    pub fn tip(&self) -> &Block {
        // `blocks` always holds at least genesis; every constructor and
        // `replace` guarantee it.
        &self.blocks[self.blocks.len() - 1]
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Never true for a constructed chain
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Get blockchain height
    pub fn height(&self) -> u64 {
        self.tip().index
    }

    /// Get a block by index
    pub fn get_block(&self, index: u64) -> Option<&Block> {
        self.blocks.get(index as usize)
    }

    /// Append a block after validating it against the tip
    pub fn append(&mut self, block: Block) -> Result<(), ChainError> {
        validate_successor(self.tip(), &block, self.difficulty, self.reward)?;
        log::debug!("Appending block {} ({})", block.index, block.hash);
        self.blocks.push(block);
        Ok(())
    }

    /// Validate the entire chain
    pub fn validate(&self) -> Result<(), ChainError> {
        validate_chain(&self.blocks, self.difficulty, self.reward)
    }

    /// Replace every block with `blocks`
    ///
    /// The candidate is validated in full first; on error nothing changes.
    /// Choosing *whether* a candidate should win is the fork resolver's job.
    pub fn replace(&mut self, blocks: Vec<Block>) -> Result<Vec<Block>, ChainError> {
        validate_chain(&blocks, self.difficulty, self.reward)?;
        Ok(std::mem::replace(&mut self.blocks, blocks))
    }

    /// Balances of every address that appears in the chain
    pub fn balances(&self) -> BTreeMap<String, Amount> {
        fold_balances(self.blocks.iter().flat_map(|b| &b.transactions))
    }

    /// Get balance for an address
    pub fn balance(&self, address: &str) -> Amount {
        self.blocks
            .iter()
            .flat_map(|b| &b.transactions)
            .map(|tx| {
                let credit = if tx.recipient == address { tx.amount } else { 0.0 };
                let debit = if tx.sender == address && !tx.is_coinbase() {
                    tx.amount
                } else {
                    0.0
                };
                credit - debit
            })
            .sum()
    }

    /// Get chain statistics
    pub fn stats(&self) -> ChainStats {
        let total_transactions = self.blocks.iter().map(Block::tx_count).sum();
        let total_minted = self.blocks.iter().map(Block::mining_reward).sum();

        ChainStats {
            height: self.height(),
            total_blocks: self.blocks.len(),
            total_transactions,
            total_minted,
            difficulty: self.difficulty,
            latest_hash: self.tip().hash.clone(),
        }
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

/// Chain statistics
#[derive(Debug, Clone, Serialize)]
pub struct ChainStats {
    pub height: u64,
    pub total_blocks: usize,
    pub total_transactions: usize,
    pub total_minted: Amount,
    pub difficulty: usize,
    pub latest_hash: String,
}
