// Copyright (c) 2024 Botho Foundation

//! Pool of accepted transactions waiting to be sealed into a block.

use tracing::debug;

use crate::transaction::Transaction;

/// Pending transactions in arrival order.
///
/// The pool is drained all at once when a block is sealed; there is no
/// eviction or reordering.
#[derive(Debug, Clone, Default)]
pub struct PendingPool {
    txs: Vec<Transaction>,
}

impl PendingPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_transactions(txs: Vec<Transaction>) -> Self {
        Self { txs }
    }

    pub fn push(&mut self, tx: Transaction) {
        debug!(
            sender = %tx.sender,
            recipient = %tx.recipient,
            amount = tx.amount,
            hash = %tx.hash.short(),
            pending = self.txs.len() + 1,
            "Transaction added to pool"
        );
        self.txs.push(tx);
    }

    /// Take every pending transaction, leaving the pool empty.
    pub fn drain(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.txs)
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.txs
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Credits `account` has already committed to send in pending transactions.
    pub fn pending_outgoing(&self, account: &str) -> u128 {
        self.txs
            .iter()
            .filter(|tx| tx.sender == account)
            .map(|tx| u128::from(tx.amount))
            .sum()
    }

    /// Net effect of every pending transaction on `account`.
    pub fn pending_delta(&self, account: &str) -> i128 {
        self.txs.iter().map(|tx| tx.delta_for(account)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empties_pool() {
        let mut pool = PendingPool::new();
        pool.push(Transaction::new("a", "b", 1, ""));
        pool.push(Transaction::new("b", "c", 2, ""));
        assert_eq!(pool.len(), 2);

        let drained = pool.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].recipient, "b");
        assert!(pool.is_empty());
    }

    #[test]
    fn test_pending_outgoing() {
        let mut pool = PendingPool::new();
        pool.push(Transaction::new("a", "b", 3, ""));
        pool.push(Transaction::new("a", "c", 4, ""));
        pool.push(Transaction::new("b", "a", 10, ""));
        assert_eq!(pool.pending_outgoing("a"), 7);
        assert_eq!(pool.pending_outgoing("b"), 10);
        assert_eq!(pool.pending_outgoing("c"), 0);
    }

    #[test]
    fn test_pending_delta_is_wide() {
        let mut pool = PendingPool::new();
        pool.push(Transaction::new("a", "b", u64::MAX, ""));
        pool.push(Transaction::new("a", "b", u64::MAX, ""));
        pool.push(Transaction::new("b", "a", 5, ""));
        assert_eq!(pool.pending_delta("b"), 2 * i128::from(u64::MAX) - 5);
        assert_eq!(pool.pending_delta("a"), 5 - 2 * i128::from(u64::MAX));
        assert_eq!(pool.pending_outgoing("a"), 2 * u128::from(u64::MAX));
    }
}
