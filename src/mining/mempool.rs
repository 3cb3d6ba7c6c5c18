//! Transaction pool (mempool) for pending transactions
//!
//! Holds accepted transfers in arrival order until a miner drains them into
//! a block. Funds are checked against the canonical chain only; pending
//! transfers are not counted against each other.

use crate::core::{Amount, Blockchain, Transaction, COINBASE};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use thiserror::Error;

/// Default maximum mempool transaction count
pub const DEFAULT_MEMPOOL_SIZE: usize = 10_000;

/// Mempool errors
///
/// All of these are recovered at the pool boundary and reported to the
/// submitter as a rejection reason.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MempoolError {
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Amount),
    #[error("Insufficient funds for {address} (has {balance}, needs {amount})")]
    InsufficientFunds {
        address: String,
        balance: Amount,
        amount: Amount,
    },
    #[error("Sender and recipient are the same address: {0}")]
    SelfTransfer(String),
    #[error("{} is reserved for block rewards", COINBASE)]
    ReservedAddress,
    #[error("Sender and recipient must not be empty")]
    EmptyAddress,
    #[error("Mempool full ({0} transactions)")]
    MempoolFull(usize),
}

/// Entry in the mempool with metadata
#[derive(Debug, Clone, Serialize)]
pub struct MempoolEntry {
    /// The transaction
    pub tx: Transaction,
    /// When the transaction was accepted
    #[serde(with = "chrono::serde::ts_seconds")]
    pub added_time: DateTime<Utc>,
}

impl MempoolEntry {
    pub fn new(tx: Transaction) -> Self {
        Self {
            tx,
            added_time: Utc::now(),
        }
    }
}

/// Mempool statistics
#[derive(Debug, Clone, Serialize)]
pub struct MempoolStats {
    pub tx_count: usize,
    pub total_amount: Amount,
}

/// Memory pool for pending transactions
#[derive(Debug)]
pub struct Mempool {
    /// Entries in order of arrival
    entries: VecDeque<MempoolEntry>,
    /// Maximum pool size
    max_size: usize,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempool {
    /// Create a new mempool
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMPOOL_SIZE)
    }

    /// Create a mempool holding at most `max_size` transactions
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_size,
        }
    }

    /// Check a transfer against the canonical chain and queue it
    pub fn add_transaction(
        &mut self,
        tx: Transaction,
        blockchain: &Blockchain,
    ) -> Result<(), MempoolError> {
        Self::check(&tx, blockchain)?;

        if self.entries.len() >= self.max_size {
            return Err(MempoolError::MempoolFull(self.max_size));
        }

        log::debug!(
            "Queued {} -> {} ({}), {} pending",
            tx.sender,
            tx.recipient,
            tx.amount,
            self.entries.len() + 1
        );
        self.entries.push_back(MempoolEntry::new(tx));
        Ok(())
    }

    /// Stateless admission rules for a submitted transfer
    pub fn check(tx: &Transaction, blockchain: &Blockchain) -> Result<(), MempoolError> {
        if tx.sender.trim().is_empty() || tx.recipient.trim().is_empty() {
            return Err(MempoolError::EmptyAddress);
        }

        if tx.is_coinbase() || tx.recipient == COINBASE {
            return Err(MempoolError::ReservedAddress);
        }

        if tx.sender == tx.recipient {
            return Err(MempoolError::SelfTransfer(tx.sender.clone()));
        }

        if !tx.has_valid_amount() {
            return Err(MempoolError::InvalidAmount(tx.amount));
        }

        let balance = blockchain.balance(&tx.sender);
        if balance < tx.amount {
            return Err(MempoolError::InsufficientFunds {
                address: tx.sender.clone(),
                balance,
                amount: tx.amount,
            });
        }

        Ok(())
    }

    /// Pending transfers whose sender cannot cover them on `blockchain`
    pub fn unfunded(&self, blockchain: &Blockchain) -> Vec<Transaction> {
        self.entries
            .iter()
            .filter(|e| blockchain.balance(&e.tx.sender) < e.tx.amount)
            .map(|e| e.tx.clone())
            .collect()
    }

    /// Remove and return every pending transaction, oldest first
    pub fn drain(&mut self) -> Vec<Transaction> {
        self.entries.drain(..).map(|entry| entry.tx).collect()
    }

    /// Put drained transactions back ahead of anything queued since
    pub fn requeue(&mut self, transactions: Vec<Transaction>) {
        for tx in transactions.into_iter().rev() {
            self.entries.push_front(MempoolEntry::new(tx));
        }
    }

    /// Snapshot of pending transactions in arrival order
    pub fn transactions(&self) -> Vec<Transaction> {
        self.entries.iter().map(|e| e.tx.clone()).collect()
    }

    /// Snapshot of pending entries with their arrival time
    pub fn entries(&self) -> Vec<MempoolEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get mempool statistics
    pub fn stats(&self) -> MempoolStats {
        MempoolStats {
            tx_count: self.entries.len(),
            total_amount: self.entries.iter().map(|e| e.tx.amount).sum(),
        }
    }
}
