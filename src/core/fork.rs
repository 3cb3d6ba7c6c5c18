//! Fork resolution and the simulated 51% attack
//!
//! An attacker mines a private branch from some ancestor of the canonical
//! tip. The branch is validated on its own and, if the chain selection
//! policy prefers it, it replaces the canonical chain wholesale. Blocks of
//! the old chain above the fork point are orphaned and their transactions
//! disappear from every balance.

use crate::core::block::Block;
use crate::core::blockchain::{validate_chain, Blockchain, ChainError};
use crate::core::transaction::{Amount, Transaction};
use log::{info, warn};
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How a competing chain is weighed against the canonical one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainSelectionPolicy {
    /// More blocks wins. Cumulative work and timestamps are ignored, which
    /// is exactly the weakness the attack demonstrates.
    LongestChain,
}

/// Policy used by the engine
pub const CHAIN_SELECTION_POLICY: ChainSelectionPolicy = ChainSelectionPolicy::LongestChain;

impl ChainSelectionPolicy {
    /// Whether `candidate` should replace `canonical`
    pub fn prefers(&self, candidate: &[Block], canonical: &[Block]) -> bool {
        match self {
            ChainSelectionPolicy::LongestChain => candidate.len() > canonical.len(),
        }
    }
}

/// Ancestor the attacker branches from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForkPoint {
    /// Rewrite the whole history after genesis
    #[default]
    Genesis,
    /// Keep blocks up to and including this height
    Height(u64),
}

/// Parameters of an attack
#[derive(Debug, Clone)]
pub struct AttackPlan {
    /// Address paid by every coinbase on the branch
    pub attacker: String,
    pub fork_point: ForkPoint,
    /// Blocks to mine on top of the fork point; `None` mines just enough to
    /// be one block longer than the canonical chain
    pub blocks: Option<usize>,
}

impl AttackPlan {
    /// Full-history rewrite that outgrows the canonical chain by one block
    pub fn new(attacker: &str) -> Self {
        Self {
            attacker: attacker.to_string(),
            fork_point: ForkPoint::Genesis,
            blocks: None,
        }
    }

    pub fn fork_at(mut self, fork_point: ForkPoint) -> Self {
        self.fork_point = fork_point;
        self
    }

    pub fn with_blocks(mut self, blocks: usize) -> Self {
        self.blocks = Some(blocks);
        self
    }
}

/// Errors raised while building a branch
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForkError {
    #[error("Mining cancelled")]
    Cancelled,
    #[error("Fork height {height} is beyond the canonical tip at {tip}")]
    ForkBeyondTip { height: u64, tip: u64 },
}

/// A fully mined alternative chain, not yet resolved
#[derive(Debug, Clone)]
pub struct Proposal {
    /// Complete candidate chain, genesis first
    pub blocks: Vec<Block>,
    pub fork_height: u64,
    /// Blocks mined on top of the fork point
    pub mined: usize,
    /// Total hash attempts spent
    pub hash_attempts: u64,
}

/// Result of an accepted replacement
#[derive(Debug, Clone, PartialEq)]
pub struct AttackOutcome {
    pub fork_height: u64,
    pub mined: usize,
    /// Canonical blocks above the fork point that were discarded
    pub orphaned: usize,
    /// Length of the new canonical chain
    pub chain_length: usize,
}

impl AttackOutcome {
    pub fn message(&self) -> String {
        format!(
            "Attack successful: chain replaced from height {} ({} blocks mined, {} orphaned)",
            self.fork_height, self.mined, self.orphaned
        )
    }
}

/// Builds and resolves competing branches
#[derive(Debug, Clone)]
pub struct ForkResolver {
    pub difficulty: usize,
    pub reward: Amount,
    pub policy: ChainSelectionPolicy,
}

impl ForkResolver {
    pub fn new(difficulty: usize, reward: Amount) -> Self {
        Self {
            difficulty,
            reward,
            policy: CHAIN_SELECTION_POLICY,
        }
    }

    /// Mine an alternative branch described by `plan` against `canonical`
    pub fn propose(
        &self,
        canonical: &Blockchain,
        plan: &AttackPlan,
        cancel: &CancellationToken,
    ) -> Result<Proposal, ForkError> {
        let tip = canonical.height();
        let fork_height = match plan.fork_point {
            ForkPoint::Genesis => 0,
            ForkPoint::Height(height) if height > tip => {
                return Err(ForkError::ForkBeyondTip { height, tip });
            }
            ForkPoint::Height(height) => height,
        };

        let kept = fork_height as usize + 1;
        let mined = plan.blocks.unwrap_or(canonical.len() + 1 - kept);

        info!(
            "Attacker {} forking at height {}, mining {} block(s)",
            plan.attacker, fork_height, mined
        );

        let start = Instant::now();
        let mut blocks: Vec<Block> = canonical.blocks()[..kept].to_vec();
        let mut hash_attempts = 0u64;

        for _ in 0..mined {
            let parent = &blocks[blocks.len() - 1];
            let mut block = Block::new(
                parent.index + 1,
                parent.hash.clone(),
                vec![Transaction::coinbase(&plan.attacker, self.reward)],
            );

            let attempts = block
                .mine(self.difficulty, cancel)
                .ok_or(ForkError::Cancelled)?;
            hash_attempts = hash_attempts.saturating_add(attempts);
            blocks.push(block);
        }

        info!(
            "Attack branch ready: {} blocks in {}ms ({} attempts)",
            blocks.len(),
            start.elapsed().as_millis(),
            hash_attempts
        );

        Ok(Proposal {
            blocks,
            fork_height,
            mined,
            hash_attempts,
        })
    }

    /// Validate `proposal` and swap it in if the policy prefers it
    ///
    /// All-or-nothing: on any error `canonical` is unchanged.
    pub fn resolve(
        &self,
        canonical: &mut Blockchain,
        proposal: Proposal,
    ) -> Result<AttackOutcome, ChainError> {
        if let Err(e) = validate_chain(&proposal.blocks, self.difficulty, self.reward) {
            warn!("Discarding invalid attack branch: {}", e);
            return Err(e);
        }

        if !self.policy.prefers(&proposal.blocks, canonical.blocks()) {
            return Err(ChainError::ChainNotLonger {
                candidate: proposal.blocks.len(),
                canonical: canonical.len(),
            });
        }

        let chain_length = proposal.blocks.len();
        let replaced = canonical.replace(proposal.blocks)?;
        let orphaned = replaced.len().saturating_sub(proposal.fork_height as usize + 1);

        info!(
            "Canonical chain replaced: {} -> {} blocks, {} orphaned",
            replaced.len(),
            chain_length,
            orphaned
        );

        Ok(AttackOutcome {
            fork_height: proposal.fork_height,
            mined: proposal.mined,
            orphaned,
            chain_length,
        })
    }
}
