//! Mining module for block creation and transaction pooling

pub mod mempool;
pub mod miner;

pub use mempool::{Mempool, MempoolEntry, MempoolError, MempoolStats, DEFAULT_MEMPOOL_SIZE};
pub use miner::{Miner, MiningError, MiningStats};
