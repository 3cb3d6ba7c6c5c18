//! fork51: a proof-of-work ledger simulator
//!
//! This crate provides a small account-style ledger featuring:
//! - SHA-256 proof of work with a leading-zero difficulty
//! - Merkle-committed blocks with a single coinbase reward
//! - A pending transaction pool checked against confirmed balances
//! - A 51% attack that rewrites history with a longer private branch
//! - A REST + WebSocket API for the dashboard
//!
//! # Example
//!
//! ```rust
//! use fork51::engine::{Engine, EngineConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let engine = Engine::new(EngineConfig { difficulty: 1, ..Default::default() }).unwrap();
//! let cancel = CancellationToken::new();
//!
//! // Alice has nothing yet
//! assert!(engine.submit("Alice", "Bob", 10.0).is_err());
//!
//! // Mine a reward, then spend it
//! engine.mine("Miner", &cancel).unwrap();
//! engine.submit("Miner", "Alice", 20.0).unwrap();
//! engine.mine("Miner", &cancel).unwrap();
//! assert_eq!(engine.balance("Alice"), 20.0);
//!
//! // Rewrite history
//! let outcome = engine.attack("Mallory", &cancel).unwrap();
//! assert_eq!(outcome.chain_length, 4);
//! assert_eq!(engine.balance("Alice"), 0.0);
//! ```

pub mod api;
pub mod cli;
pub mod core;
pub mod crypto;
pub mod engine;
pub mod mining;

// Re-export commonly used types
pub use api::{create_router, ApiState};
pub use core::{
    AttackOutcome, AttackPlan, Block, Blockchain, ChainError, ChainSelectionPolicy, ForkPoint,
    ForkResolver, Transaction, CHAIN_SELECTION_POLICY,
};
pub use engine::{ConfigError, Engine, EngineConfig, EngineError};
pub use mining::{Mempool, MempoolError, Miner, MiningError};
