//! The ledger engine
//!
//! One owned instance of the canonical chain and the pending pool behind an
//! explicit lock boundary:
//!
//! - `chain` is read under a brief shared lock (balances, tip, listing) and
//!   written under a brief exclusive lock (append, replace)
//! - `pool` guards submit / drain / requeue
//! - `mutation` serializes the long-running operations (mine, attack); the
//!   nonce search runs holding only this gate, so reads and submissions
//!   stay responsive while a block is being mined
//!
//! Lock order is `mutation` -> `pool` -> `chain`. The pool lock is never
//! requested while the chain lock is held.

use crate::core::{
    is_valid_address, Amount, AttackOutcome, AttackPlan, Block, Blockchain, ChainError,
    ChainStats, ForkError, ForkResolver, Transaction, BLOCK_REWARD, DEFAULT_DIFFICULTY,
    MAX_DIFFICULTY,
};
use crate::mining::{
    Mempool, MempoolEntry, MempoolError, MempoolStats, Miner, MiningError, MiningStats,
    DEFAULT_MEMPOOL_SIZE,
};
use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Mempool(#[from] MempoolError),
    #[error(transparent)]
    Mining(#[from] MiningError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Fork(#[from] ForkError),
    #[error("Invalid reward address {0:?}")]
    InvalidAddress(String),
}

/// Rejected engine configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Difficulty {0} is above the maximum of {}", MAX_DIFFICULTY)]
    DifficultyTooHigh(usize),
    #[error("Block reward must be positive and finite, got {0}")]
    InvalidReward(Amount),
    #[error("Mempool size must be at least 1")]
    EmptyMempool,
}

impl EngineError {
    /// Whether the operation stopped because its token was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Mining(MiningError::MiningCancelled))
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Leading zero hex characters required of every block hash
    pub difficulty: usize,
    /// Coinbase reward per block
    pub reward: Amount,
    /// Maximum number of pending transactions
    pub mempool_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            reward: BLOCK_REWARD,
            mempool_size: DEFAULT_MEMPOOL_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(ConfigError::DifficultyTooHigh(self.difficulty));
        }
        if !(self.reward.is_finite() && self.reward > 0.0) {
            return Err(ConfigError::InvalidReward(self.reward));
        }
        if self.mempool_size == 0 {
            return Err(ConfigError::EmptyMempool);
        }
        Ok(())
    }
}

/// A freshly mined block and how long it took
#[derive(Debug, Clone)]
pub struct MinedBlock {
    pub block: Block,
    pub stats: MiningStats,
}

/// Canonical chain plus pending pool
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    chain: RwLock<Blockchain>,
    pool: Mutex<Mempool>,
    mutation: Mutex<()>,
}

impl Engine {
    /// Build the engine and mine its genesis block
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let chain = Blockchain::with_params(config.difficulty, config.reward);
        info!(
            "Engine ready: difficulty {}, reward {}, genesis {}",
            config.difficulty,
            config.reward,
            chain.tip().hash
        );

        Ok(Self {
            chain: RwLock::new(chain),
            pool: Mutex::new(Mempool::with_capacity(config.mempool_size)),
            mutation: Mutex::new(()),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // The chain is only written after validation, so a poisoned guard still
    // holds a consistent value.
    fn read_chain(&self) -> RwLockReadGuard<'_, Blockchain> {
        self.chain.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_chain(&self) -> RwLockWriteGuard<'_, Blockchain> {
        self.chain.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pool(&self) -> MutexGuard<'_, Mempool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_mutation(&self) -> MutexGuard<'_, ()> {
        self.mutation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Balances of every address on the canonical chain
    pub fn balances(&self) -> BTreeMap<String, Amount> {
        self.read_chain().balances()
    }

    pub fn balance(&self, address: &str) -> Amount {
        self.read_chain().balance(address)
    }

    /// Snapshot of the canonical chain
    pub fn chain(&self) -> Vec<Block> {
        self.read_chain().blocks().to_vec()
    }

    /// The last canonical block
    pub fn tip(&self) -> Block {
        self.read_chain().tip().clone()
    }

    pub fn chain_len(&self) -> usize {
        self.read_chain().len()
    }

    /// Re-validate the canonical chain from genesis
    pub fn validate(&self) -> Result<usize, ChainError> {
        let chain = self.read_chain();
        chain.validate()?;
        Ok(chain.len())
    }

    pub fn stats(&self) -> ChainStats {
        self.read_chain().stats()
    }

    /// Pending transactions in arrival order
    pub fn pending(&self) -> Vec<Transaction> {
        self.lock_pool().transactions()
    }

    /// Pending entries with their arrival time
    pub fn pending_entries(&self) -> Vec<MempoolEntry> {
        self.lock_pool().entries()
    }

    pub fn mempool_stats(&self) -> MempoolStats {
        self.lock_pool().stats()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Queue a transfer for the next block
    ///
    /// May run while a mine or attack is in progress; the transfer simply
    /// waits for the next round.
    pub fn submit(
        &self,
        sender: &str,
        recipient: &str,
        amount: Amount,
    ) -> Result<Transaction, MempoolError> {
        let tx = Transaction::new(sender, recipient, amount);
        let mut pool = self.lock_pool();
        let chain = self.read_chain();

        match pool.add_transaction(tx.clone(), &chain) {
            Ok(()) => {
                info!("Accepted {} -> {} ({})", sender, recipient, amount);
                Ok(tx)
            }
            Err(e) => {
                info!("Rejected {} -> {} ({}): {}", sender, recipient, amount, e);
                Err(e)
            }
        }
    }

    /// Mine the pending pool into a new block paying `miner_address`
    ///
    /// Runs until a nonce is found or `cancel` fires. On cancellation the
    /// drained transactions go back to the front of the pool.
    pub fn mine(
        &self,
        miner_address: &str,
        cancel: &CancellationToken,
    ) -> Result<MinedBlock, EngineError> {
        if !is_valid_address(miner_address) {
            return Err(EngineError::InvalidAddress(miner_address.to_string()));
        }

        let _gate = self.begin_mutation();

        let parent = self.tip();
        let transactions = self.lock_pool().drain();
        let miner = Miner::with_reward(miner_address, self.config.reward);

        let mined = miner.mine_block_detached(
            &parent,
            self.config.difficulty,
            transactions.clone(),
            cancel,
        );

        let (block, stats) = match mined {
            Ok(result) => result,
            Err(e) => {
                self.lock_pool().requeue(transactions);
                return Err(e.into());
            }
        };

        let appended = self.write_chain().append(block.clone());
        if let Err(e) = appended {
            warn!("Mined block {} rejected: {}", block.index, e);
            self.lock_pool().requeue(transactions);
            return Err(MiningError::from(e).into());
        }

        Ok(MinedBlock { block, stats })
    }

    /// Run the default 51% attack: rewrite history from genesis with a
    /// branch one block longer than the canonical chain
    pub fn attack(
        &self,
        attacker: &str,
        cancel: &CancellationToken,
    ) -> Result<AttackOutcome, EngineError> {
        self.attack_with(&AttackPlan::new(attacker), cancel)
    }

    /// Run an attack described by `plan`
    pub fn attack_with(
        &self,
        plan: &AttackPlan,
        cancel: &CancellationToken,
    ) -> Result<AttackOutcome, EngineError> {
        if !is_valid_address(&plan.attacker) {
            return Err(EngineError::InvalidAddress(plan.attacker.clone()));
        }

        let _gate = self.begin_mutation();
        let resolver = ForkResolver::new(self.config.difficulty, self.config.reward);

        let snapshot = self.read_chain().clone();
        let proposal = resolver
            .propose(&snapshot, plan, cancel)
            .map_err(|e| match e {
                ForkError::Cancelled => EngineError::Mining(MiningError::MiningCancelled),
                other => EngineError::Fork(other),
            })?;

        let outcome = resolver.resolve(&mut self.write_chain(), proposal);
        match &outcome {
            Ok(o) => {
                info!("Attack by {} succeeded: {}", plan.attacker, o.message());
                self.warn_unfunded_pending();
            }
            Err(e) => info!("Attack by {} failed: {}", plan.attacker, e),
        }
        outcome.map_err(EngineError::from)
    }

    /// Pending transfers were admitted against the old history; after a
    /// rewrite some of them may no longer be covered.
    fn warn_unfunded_pending(&self) {
        let pool = self.lock_pool();
        let chain = self.read_chain();
        for tx in pool.unfunded(&chain) {
            warn!(
                "Pending {} -> {} ({}) is no longer funded after the rewrite",
                tx.sender, tx.recipient, tx.amount
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::COINBASE;
    use std::sync::Arc;
    use std::thread;

    fn engine() -> Engine {
        Engine::new(EngineConfig {
            difficulty: 1,
            ..Default::default()
        })
        .unwrap()
    }

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[test]
    fn test_transfer_mine_attack_walkthrough() {
        let engine = engine();
        assert!(engine.balances().is_empty());

        let err = engine.submit("Alice", "Bob", 10.0).unwrap_err();
        assert!(matches!(err, MempoolError::InsufficientFunds { .. }));

        engine.mine("Miner", &token()).unwrap();
        assert_eq!(
            engine.balances(),
            BTreeMap::from([("Miner".to_string(), 50.0)])
        );

        engine.submit("Miner", "Alice", 20.0).unwrap();
        engine.mine("Miner", &token()).unwrap();
        assert_eq!(
            engine.balances(),
            BTreeMap::from([("Alice".to_string(), 20.0), ("Miner".to_string(), 80.0)])
        );
    }

    #[test]
    fn test_submit_then_mine_includes_transaction() {
        let engine = engine();
        engine.mine("Miner", &token()).unwrap();
        let tx = engine.submit("Miner", "Bob", 5.0).unwrap();

        let mined = engine.mine("Miner", &token()).unwrap();
        assert_eq!(mined.block.transactions.len(), 2);
        assert!(mined.block.transactions[0].is_coinbase());
        assert_eq!(mined.block.transactions[1], tx);
        assert!(engine.pending().is_empty());
        assert!(mined.block.is_valid_pow(1));
    }

    #[test]
    fn test_cancelled_mine_requeues_transactions() {
        let engine = engine();
        engine.mine("Miner", &token()).unwrap();
        engine.submit("Miner", "Bob", 5.0).unwrap();

        let cancel = token();
        cancel.cancel();
        let err = engine.mine("Miner", &cancel).unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(engine.chain_len(), 2);
        assert_eq!(engine.pending().len(), 1);
    }

    #[test]
    fn test_attack_rewrites_history() {
        let engine = engine();
        engine.mine("Miner", &token()).unwrap();
        engine.submit("Miner", "Alice", 20.0).unwrap();
        engine.mine("Miner", &token()).unwrap();

        let outcome = engine.attack("Mallory", &token()).unwrap();
        assert_eq!(outcome.chain_length, 4);

        let balances = engine.balances();
        assert!(balances["Mallory"] >= BLOCK_REWARD);
        assert!(!balances.contains_key("Alice"));
        assert_eq!(engine.validate(), Ok(4));
    }

    #[test]
    fn test_short_attack_changes_nothing() {
        let engine = engine();
        engine.mine("Miner", &token()).unwrap();
        engine.mine("Miner", &token()).unwrap();
        let before = engine.balances();

        let plan = AttackPlan::new("Mallory").with_blocks(1);
        let err = engine.attack_with(&plan, &token()).unwrap_err();

        assert_eq!(
            err,
            EngineError::Chain(ChainError::ChainNotLonger {
                candidate: 2,
                canonical: 3
            })
        );
        assert_eq!(engine.balances(), before);
        assert_eq!(engine.chain_len(), 3);
    }

    #[test]
    fn test_attack_leaves_pool_untouched() {
        let engine = engine();
        engine.mine("Miner", &token()).unwrap();
        engine.submit("Miner", "Alice", 1.0).unwrap();

        engine.attack("Mallory", &token()).unwrap();
        assert_eq!(engine.pending().len(), 1);

        // Miner's reward was orphaned, so the queued transfer is now unfunded
        let stale = engine.lock_pool().unfunded(&engine.read_chain());
        assert_eq!(stale, vec![Transaction::new("Miner", "Alice", 1.0)]);
    }

    #[test]
    fn test_cancelled_attack() {
        let engine = engine();
        let cancel = token();
        cancel.cancel();
        let err = engine.attack("Mallory", &cancel).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(engine.chain_len(), 1);
    }

    #[test]
    fn test_sender_is_not_authenticated() {
        // Known limitation: transfers carry no signature, so anyone can
        // spend from any funded address by naming it as sender.
        let engine = engine();
        engine.mine("Victim", &token()).unwrap();

        assert!(engine.submit("Victim", "Thief", 50.0).is_ok());
        engine.mine("Thief", &token()).unwrap();
        assert_eq!(engine.balance("Thief"), 100.0);
        assert_eq!(engine.balance("Victim"), 0.0);
    }

    #[test]
    fn test_reserved_and_blank_miners_rejected() {
        let engine = engine();
        engine.mine("Miner", &token()).unwrap();
        engine.submit("Miner", "Alice", 5.0).unwrap();

        for name in [COINBASE, "", "  "] {
            assert_eq!(
                engine.mine(name, &token()).unwrap_err(),
                EngineError::InvalidAddress(name.to_string())
            );
        }

        assert_eq!(engine.chain_len(), 2);
        assert_eq!(engine.pending().len(), 1);
        let balances = engine.balances();
        assert!(!balances.contains_key(COINBASE));
        assert!(!balances.contains_key(""));
    }

    #[test]
    fn test_reserved_and_blank_attackers_rejected() {
        let engine = engine();
        engine.mine("Miner", &token()).unwrap();

        for name in [COINBASE, ""] {
            assert_eq!(
                engine.attack(name, &token()).unwrap_err(),
                EngineError::InvalidAddress(name.to_string())
            );
        }
        assert_eq!(engine.balance("Miner"), BLOCK_REWARD);
        assert_eq!(engine.chain_len(), 2);
    }

    #[test]
    fn test_config_validation() {
        assert!(EngineConfig::default().validate().is_ok());

        let too_hard = EngineConfig {
            difficulty: MAX_DIFFICULTY + 1,
            ..Default::default()
        };
        assert_eq!(
            Engine::new(too_hard).unwrap_err(),
            ConfigError::DifficultyTooHigh(65)
        );

        for reward in [-50.0, 0.0, f64::INFINITY] {
            let config = EngineConfig {
                difficulty: 1,
                reward,
                ..Default::default()
            };
            assert_eq!(
                Engine::new(config).unwrap_err(),
                ConfigError::InvalidReward(reward)
            );
        }

        let nan = EngineConfig {
            reward: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(nan.validate(), Err(ConfigError::InvalidReward(_))));

        let no_pool = EngineConfig {
            mempool_size: 0,
            ..Default::default()
        };
        assert_eq!(no_pool.validate(), Err(ConfigError::EmptyMempool));
    }

    #[test]
    fn test_custom_reward_is_minted() {
        let engine = Engine::new(EngineConfig {
            difficulty: 1,
            reward: 25.0,
            ..Default::default()
        })
        .unwrap();
        engine.mine("Miner", &token()).unwrap();
        engine.attack("Mallory", &token()).unwrap();

        assert_eq!(engine.balance("Mallory"), 50.0);
        assert_eq!(engine.validate(), Ok(3));
    }

    #[test]
    fn test_submit_during_mine_waits_for_next_block() {
        let engine = Arc::new(
            Engine::new(EngineConfig {
                difficulty: 4,
                ..Default::default()
            })
            .unwrap(),
        );
        engine.mine("Miner", &token()).unwrap();
        let first = engine.submit("Miner", "Alice", 5.0).unwrap();

        let miner = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.mine("Miner", &CancellationToken::new()))
        };
        // the pool empties as soon as the miner has taken its transactions
        while !engine.pending().is_empty() {
            thread::yield_now();
        }
        let late = engine.submit("Miner", "Bob", 5.0).unwrap();

        let mined = miner.join().unwrap().unwrap();
        assert!(mined.block.transactions.contains(&first));
        assert!(!mined.block.transactions.contains(&late));
        assert_eq!(engine.pending(), vec![late.clone()]);

        let next = engine.mine("Miner", &token()).unwrap();
        assert_eq!(next.block.transactions[1], late);
    }

    #[test]
    fn test_concurrent_miners_never_share_transactions() {
        let engine = Arc::new(engine());
        engine.mine("Miner", &token()).unwrap();
        for i in 0..8 {
            engine.submit("Miner", &format!("r{}", i), 1.0).unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    engine
                        .mine(&format!("m{}", i), &CancellationToken::new())
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let chain = engine.chain();
        assert_eq!(chain.len(), 6);
        let transfers: usize = chain
            .iter()
            .flat_map(|b| &b.transactions)
            .filter(|tx| !tx.is_coinbase())
            .count();
        assert_eq!(transfers, 8);
        assert!(engine.validate().is_ok());

        let total: Amount = engine.balances().values().sum();
        assert_eq!(total, 5.0 * BLOCK_REWARD);
    }
}
