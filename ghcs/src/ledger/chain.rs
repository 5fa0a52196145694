// Copyright (c) 2024 Botho Foundation

//! Simulated proof-of-work chain.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::{
    BackendKind, ChainInfo, CreditLedger, HistoryEntry, LedgerError, LedgerExport, LedgerSummary,
    SealPolicy, SealTarget, MAX_AMOUNT,
};
use crate::account::validate_account_name;
use crate::address::Address;
use crate::block::{chain_hash, pow, Block, BlockSummary, GENESIS_PROOF};
use crate::mempool::PendingPool;
use crate::transaction::{Transaction, NETWORK_SENDER};

/// In-memory hash-linked chain with a pending pool.
///
/// Blocks are only ever appended. Balances and history are computed by
/// replaying sealed blocks; pooled transactions are invisible to both.
#[derive(Debug, Clone)]
pub struct SimulatedLedger {
    chain: Vec<Block>,
    pool: PendingPool,
    frozen: HashSet<String>,
    policy: SealPolicy,
}

impl SimulatedLedger {
    /// Fresh chain holding only the genesis block.
    pub fn new(policy: SealPolicy) -> Self {
        Self {
            chain: vec![Block::genesis()],
            pool: PendingPool::new(),
            frozen: HashSet::new(),
            policy,
        }
    }

    /// Rebuild from persisted parts, verifying the chain and pooled
    /// transactions first.
    pub fn from_parts(
        chain: Vec<Block>,
        pending: Vec<Transaction>,
        frozen: impl IntoIterator<Item = String>,
        policy: SealPolicy,
    ) -> Result<Self, LedgerError> {
        verify_chain(&chain)?;
        for tx in &pending {
            if !tx.verify_hash() {
                return Err(LedgerError::Integrity(format!(
                    "pending transaction {} does not match its content",
                    tx.hash
                )));
            }
        }
        Ok(Self {
            chain,
            pool: PendingPool::from_transactions(pending),
            frozen: frozen.into_iter().collect(),
            policy,
        })
    }

    pub fn policy(&self) -> SealPolicy {
        self.policy
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending(&self) -> &[Transaction] {
        self.pool.transactions()
    }

    pub fn tip(&self) -> &Block {
        // The chain always holds at least the genesis block.
        &self.chain[self.chain.len() - 1]
    }

    /// Queue a transaction for the next block.
    ///
    /// Returns the index of the block it will be sealed into. No balance or
    /// frozen checks happen here.
    pub fn add_transaction(
        &mut self,
        sender: &str,
        recipient: &str,
        amount: u64,
        details: &str,
    ) -> Result<u64, LedgerError> {
        check_amount(amount)?;
        check_name(sender)?;
        check_name(recipient)?;

        self.pool
            .push(Transaction::new(sender, recipient, amount, details));
        Ok(self.tip().index + 1)
    }

    /// Search for a proof against the tip and seal the pool into a new block.
    pub fn seal_block(&mut self) -> &Block {
        let proof = pow::solve(self.tip().proof);
        self.append(proof)
    }

    fn append(&mut self, proof: u64) -> &Block {
        let transactions = self.pool.drain();
        let block = Block::next(self.tip(), proof, transactions);
        info!(
            index = block.index,
            proof = block.proof,
            txs = block.transactions.len(),
            prev = %block.previous_hash.short(),
            "Sealed block"
        );
        self.chain.push(block);
        self.tip()
    }

    pub fn balance_of(&self, account: &str) -> i64 {
        saturate(self.replay(account))
    }

    /// Sealed balance less what the account already owes in the pool.
    pub fn available_balance(&self, account: &str) -> i64 {
        saturate(self.available(account))
    }

    /// Exact sealed balance. Raw submissions are not balance checked, so the
    /// sum is kept wide enough never to overflow.
    fn replay(&self, account: &str) -> i128 {
        self.chain
            .iter()
            .flat_map(|b| b.transactions.iter())
            .map(|tx| tx.delta_for(account))
            .sum()
    }

    fn available(&self, account: &str) -> i128 {
        self.replay(account) - self.pool.pending_outgoing(account) as i128
    }

    /// Reject a credit that would leave `account` above [`MAX_AMOUNT`] once
    /// the pool is sealed.
    fn ensure_room_for(&self, account: &str, amount: u64) -> Result<(), LedgerError> {
        let projected =
            self.replay(account) + self.pool.pending_delta(account) + i128::from(amount);
        if projected > i128::from(MAX_AMOUNT) {
            warn!(account, amount, "Credit rejected, balance would overflow");
            return Err(LedgerError::BalanceOverflow(account.to_string()));
        }
        Ok(())
    }

    /// Transactions touching `account`, newest block first and newest
    /// transaction first within a block.
    pub fn history_of<'a>(
        &'a self,
        account: &'a str,
        limit: usize,
    ) -> impl Iterator<Item = HistoryEntry> + 'a {
        self.chain
            .iter()
            .rev()
            .flat_map(move |block| {
                block
                    .transactions
                    .iter()
                    .rev()
                    .filter(move |tx| tx.involves(account))
                    .map(move |tx| HistoryEntry::from_transaction(block.index, tx))
            })
            .take(limit)
    }

    pub fn verify(&self) -> Result<(), LedgerError> {
        verify_chain(&self.chain)
    }

    pub fn chain_info(&self) -> ChainInfo {
        let tip = self.tip();
        ChainInfo {
            length: self.chain.len() as u64,
            tip_index: tip.index,
            tip_hash: chain_hash(tip),
            tip_timestamp: tip.timestamp,
            total_transactions: self.chain.iter().map(|b| b.transactions.len()).sum(),
            pending_transactions: self.pool.len(),
        }
    }

    fn seal_if_immediate(&mut self) {
        if self.policy == SealPolicy::Immediate {
            self.seal_block();
        }
    }

    fn ensure_not_frozen(&self, account: &str) -> Result<(), LedgerError> {
        if self.frozen.contains(account) {
            return Err(LedgerError::AccountFrozen(account.to_string()));
        }
        Ok(())
    }
}

fn check_amount(amount: u64) -> Result<(), LedgerError> {
    match amount {
        0 => Err(LedgerError::ZeroAmount),
        a if a > MAX_AMOUNT => Err(LedgerError::AmountTooLarge(a)),
        _ => Ok(()),
    }
}

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

fn check_name(name: &str) -> Result<(), LedgerError> {
    if name.trim().is_empty() {
        return Err(LedgerError::InvalidAccount {
            name: name.to_string(),
            reason: "account name is empty",
        });
    }
    Ok(())
}

/// Check contiguity, linkage, proofs and transaction hashes of a chain.
pub fn verify_chain(chain: &[Block]) -> Result<(), LedgerError> {
    let Some(genesis) = chain.first() else {
        return Err(LedgerError::Integrity("chain has no genesis block".into()));
    };
    if genesis.index != 1 || !genesis.previous_hash.is_zero() || genesis.proof != GENESIS_PROOF {
        return Err(LedgerError::Integrity(format!(
            "block {} is not a valid genesis block",
            genesis.index
        )));
    }

    for pair in chain.windows(2) {
        let (prev, block) = (&pair[0], &pair[1]);
        if block.index != prev.index + 1 {
            return Err(LedgerError::Integrity(format!(
                "block {} follows block {}",
                block.index, prev.index
            )));
        }
        if block.previous_hash != chain_hash(prev) {
            return Err(LedgerError::Integrity(format!(
                "block {} does not link to block {}",
                block.index, prev.index
            )));
        }
        if !pow::valid_proof(prev.proof, block.proof) {
            return Err(LedgerError::Integrity(format!(
                "block {} carries an invalid proof {}",
                block.index, block.proof
            )));
        }
    }

    for block in chain {
        for tx in &block.transactions {
            if tx.amount == 0 || tx.amount > MAX_AMOUNT || !tx.verify_hash() {
                return Err(LedgerError::Integrity(format!(
                    "transaction {} in block {} does not match its content",
                    tx.hash, block.index
                )));
            }
        }
    }

    debug!(blocks = chain.len(), "Chain verified");
    Ok(())
}

impl CreditLedger for SimulatedLedger {
    fn backend(&self) -> BackendKind {
        BackendKind::Simulated
    }

    fn register(&mut self, name: &str, _address: Option<Address>) -> Result<(), LedgerError> {
        validate_account_name(name).map_err(|reason| LedgerError::InvalidAccount {
            name: name.to_string(),
            reason,
        })
    }

    fn submit(
        &mut self,
        sender: &str,
        recipient: &str,
        amount: u64,
        details: &str,
    ) -> Result<u64, LedgerError> {
        self.add_transaction(sender, recipient, amount, details)
    }

    fn mint(&mut self, account: &str, amount: u64, details: &str) -> Result<(), LedgerError> {
        check_amount(amount)?;
        self.register(account, None)?;
        self.ensure_not_frozen(account)?;
        self.ensure_room_for(account, amount)?;

        self.add_transaction(NETWORK_SENDER, account, amount, details)?;
        info!(account, amount, "Credits issued");
        self.seal_if_immediate();
        Ok(())
    }

    fn transfer(
        &mut self,
        from: &str,
        to: &str,
        amount: u64,
        details: &str,
    ) -> Result<(), LedgerError> {
        check_amount(amount)?;
        if from == to {
            return Err(LedgerError::SelfTransfer(from.to_string()));
        }
        self.register(from, None)?;
        self.register(to, None)?;
        self.ensure_not_frozen(from)?;
        self.ensure_not_frozen(to)?;

        let available = self.available(from);
        if available < i128::from(amount) {
            let available = saturate(available);
            warn!(from, available, requested = amount, "Transfer rejected");
            return Err(LedgerError::InsufficientBalance {
                account: from.to_string(),
                available,
                requested: amount,
            });
        }
        self.ensure_room_for(to, amount)?;

        self.add_transaction(from, to, amount, details)?;
        info!(from, to, amount, "Credits transferred");
        self.seal_if_immediate();
        Ok(())
    }

    fn set_frozen(&mut self, account: &str, frozen: bool) -> Result<(), LedgerError> {
        check_name(account)?;
        if frozen {
            self.frozen.insert(account.to_string());
        } else {
            self.frozen.remove(account);
        }
        info!(account, frozen, "Account freeze state changed");
        Ok(())
    }

    fn is_frozen(&self, account: &str) -> bool {
        self.frozen.contains(account)
    }

    fn balance(&self, account: &str) -> i64 {
        self.balance_of(account)
    }

    fn history(&self, account: &str, limit: usize) -> Vec<HistoryEntry> {
        self.history_of(account, limit).collect()
    }

    fn commit(&mut self) -> Result<Option<BlockSummary>, LedgerError> {
        Ok(Some(self.seal_block().summary()))
    }

    fn seal_target(&self) -> Option<SealTarget> {
        let tip = self.tip();
        Some(SealTarget {
            tip_index: tip.index,
            tip_hash: chain_hash(tip),
            last_proof: tip.proof,
        })
    }

    fn commit_proof(
        &mut self,
        target: &SealTarget,
        proof: u64,
    ) -> Result<Option<BlockSummary>, LedgerError> {
        let tip = self.tip();
        if tip.index != target.tip_index || chain_hash(tip) != target.tip_hash {
            debug!(
                target = target.tip_index,
                tip = tip.index,
                "Discarding proof found against a stale tip"
            );
            return Ok(None);
        }
        if !pow::valid_proof(tip.proof, proof) {
            return Err(LedgerError::Integrity(format!(
                "proof {proof} does not satisfy the difficulty target"
            )));
        }
        Ok(Some(self.append(proof).summary()))
    }

    fn pending_count(&self) -> usize {
        self.pool.len()
    }

    fn verify(&self) -> Result<(), LedgerError> {
        SimulatedLedger::verify(self)
    }

    fn summary(&self) -> LedgerSummary {
        LedgerSummary::Chain(self.chain_info())
    }

    fn export(&self) -> LedgerExport<'_> {
        LedgerExport::Chain {
            chain: &self.chain,
            pending: self.pool.transactions(),
        }
    }
}
