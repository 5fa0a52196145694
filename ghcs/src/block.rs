// Copyright (c) 2024 Botho Foundation

//! Blocks of the simulated chain and the proof-of-work gate that seals them.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::hashing::{CanonicalHasher, Hash256};
use crate::transaction::Transaction;

/// Proof recorded in the genesis block
pub const GENESIS_PROOF: u64 = 100;

const BLOCK_HASH_DOMAIN: &[u8] = b"ghcs-block-v1";

/// A sealed block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// 1-based position in the chain
    pub index: u64,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Proof-of-work solution against the previous block's proof
    pub proof: u64,

    /// `chain_hash` of the previous block (zero for genesis)
    pub previous_hash: Hash256,

    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn genesis() -> Self {
        Self::genesis_at(Utc::now())
    }

    pub fn genesis_at(timestamp: DateTime<Utc>) -> Self {
        Self {
            index: 1,
            timestamp: timestamp.trunc_subsecs(3),
            proof: GENESIS_PROOF,
            previous_hash: Hash256::ZERO,
            transactions: Vec::new(),
        }
    }

    /// Build the block that follows `prev`.
    pub fn next(prev: &Block, proof: u64, transactions: Vec<Transaction>) -> Self {
        Self {
            index: prev.index + 1,
            timestamp: Utc::now().trunc_subsecs(3),
            proof,
            previous_hash: chain_hash(prev),
            transactions,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 1 && self.previous_hash.is_zero()
    }

    pub fn hash(&self) -> Hash256 {
        chain_hash(self)
    }

    pub fn summary(&self) -> BlockSummary {
        BlockSummary {
            index: self.index,
            hash: self.hash(),
            transaction_count: self.transactions.len(),
        }
    }
}

/// Hash of a block over its canonical serialization.
///
/// Fields go in declaration order; each transaction contributes its fields
/// and its stored content hash.
pub fn chain_hash(block: &Block) -> Hash256 {
    let mut hasher = CanonicalHasher::new(BLOCK_HASH_DOMAIN);
    hasher
        .u64(block.index)
        .i64(block.timestamp.timestamp_millis())
        .u64(block.proof)
        .hash(&block.previous_hash)
        .u64(block.transactions.len() as u64);
    for tx in &block.transactions {
        hasher
            .str(&tx.sender)
            .str(&tx.recipient)
            .u64(tx.amount)
            .str(&tx.details)
            .i64(tx.timestamp.timestamp_millis())
            .hash(&tx.hash);
    }
    hasher.finish()
}

/// What a seal reports back to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub index: u64,
    pub hash: Hash256,
    pub transaction_count: usize,
}

/// Proof-of-work puzzle.
///
/// A proof `p` is valid against the previous proof `q` when the hex SHA-256
/// of the decimal string `"{q}{p}"` starts with `DIFFICULTY` zero characters.
pub mod pow {
    use sha2::{Digest, Sha256};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Required leading zero hex characters
    pub const DIFFICULTY: usize = 4;

    /// Candidates tried between cancellation checks
    const BATCH_SIZE: u64 = 10_000;

    pub fn proof_digest(last_proof: u64, proof: u64) -> [u8; 32] {
        Sha256::digest(format!("{last_proof}{proof}").as_bytes()).into()
    }

    pub fn leading_zero_nibbles(digest: &[u8; 32]) -> usize {
        let mut count = 0;
        for byte in digest {
            if *byte == 0 {
                count += 2;
                continue;
            }
            if byte >> 4 == 0 {
                count += 1;
            }
            break;
        }
        count
    }

    pub fn valid_proof(last_proof: u64, proof: u64) -> bool {
        leading_zero_nibbles(&proof_digest(last_proof, proof)) >= DIFFICULTY
    }

    /// Search upward from zero for the first valid proof.
    pub fn solve(last_proof: u64) -> u64 {
        let mut proof = 0u64;
        while !valid_proof(last_proof, proof) {
            proof = proof.wrapping_add(1);
        }
        proof
    }

    /// Same search as [`solve`], checking `cancel` every batch.
    ///
    /// Returns `None` if cancelled before a proof was found.
    pub fn solve_cancellable(last_proof: u64, cancel: &AtomicBool) -> Option<u64> {
        let mut proof = 0u64;
        loop {
            let batch_end = proof.saturating_add(BATCH_SIZE);
            while proof < batch_end {
                if valid_proof(last_proof, proof) {
                    return Some(proof);
                }
                proof += 1;
            }
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_genesis_shape() {
        let genesis = Block::genesis();
        assert_eq!(genesis.index, 1);
        assert_eq!(genesis.proof, GENESIS_PROOF);
        assert!(genesis.previous_hash.is_zero());
        assert!(genesis.transactions.is_empty());
        assert!(genesis.is_genesis());
    }

    #[test]
    fn test_next_links_to_previous() {
        let genesis = Block::genesis();
        let proof = pow::solve(genesis.proof);
        let tx = Transaction::new("system", "alice", 5, "grant");
        let block = Block::next(&genesis, proof, vec![tx]);
        assert_eq!(block.index, 2);
        assert_eq!(block.previous_hash, chain_hash(&genesis));
        assert!(pow::valid_proof(genesis.proof, block.proof));
    }

    #[test]
    fn test_chain_hash_changes_with_content() {
        let genesis = Block::genesis();
        let a = Block::next(&genesis, 1, vec![Transaction::new("x", "y", 1, "")]);
        let mut b = a.clone();
        b.transactions[0].amount = 2;
        assert_ne!(chain_hash(&a), chain_hash(&b));

        let mut c = a.clone();
        c.proof = 2;
        assert_ne!(chain_hash(&a), chain_hash(&c));
    }

    #[test]
    fn test_leading_zero_nibbles() {
        let mut digest = [0xffu8; 32];
        assert_eq!(pow::leading_zero_nibbles(&digest), 0);
        digest[0] = 0x0f;
        assert_eq!(pow::leading_zero_nibbles(&digest), 1);
        digest[0] = 0x00;
        digest[1] = 0x00;
        digest[2] = 0x1f;
        assert_eq!(pow::leading_zero_nibbles(&digest), 5);
    }

    #[test]
    fn test_solve_finds_lowest_valid_proof() {
        let proof = pow::solve(GENESIS_PROOF);
        assert!(pow::valid_proof(GENESIS_PROOF, proof));
        assert!((0..proof).all(|p| !pow::valid_proof(GENESIS_PROOF, p)));
        let digest = hex::encode(pow::proof_digest(GENESIS_PROOF, proof));
        assert!(digest.starts_with("0000"));
    }

    #[test]
    fn test_solve_cancellable_matches_solve() {
        let cancel = AtomicBool::new(false);
        assert_eq!(
            pow::solve_cancellable(GENESIS_PROOF, &cancel),
            Some(pow::solve(GENESIS_PROOF))
        );
    }

    #[test]
    fn test_solve_cancellable_stops_when_cancelled() {
        // A last proof whose first valid answer lies beyond the first batch.
        let last = (0..1_000u64)
            .find(|q| pow::solve(*q) >= 10_000)
            .expect("some last proof needs more than one batch");
        let cancel = AtomicBool::new(true);
        assert_eq!(pow::solve_cancellable(last, &cancel), None);
    }
}
