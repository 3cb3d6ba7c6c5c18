//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Transactions (account-style transfers, coinbase rewards)
//! - Blocks (with proof of work and merkle commitment)
//! - Blockchain (validation and the balance projection)
//! - Fork resolution (the 51% attack and the chain selection policy)

pub mod block;
pub mod blockchain;
pub mod fork;
pub mod transaction;

pub use block::{Block, CANCEL_CHECK_INTERVAL, GENESIS_TIMESTAMP};
pub use blockchain::{
    fold_balances, validate_chain, validate_successor, Blockchain, ChainError, ChainStats,
    BLOCK_REWARD, DEFAULT_DIFFICULTY, MAX_DIFFICULTY,
};
pub use fork::{
    AttackOutcome, AttackPlan, ChainSelectionPolicy, ForkError, ForkPoint, ForkResolver,
    Proposal, CHAIN_SELECTION_POLICY,
};
pub use transaction::{is_valid_address, Address, Amount, Transaction, COINBASE};
