// Copyright (c) 2024 Botho Foundation

//! Credit ledgers.
//!
//! Two backends implement [`CreditLedger`]:
//!
//! - [`SimulatedLedger`]: hash-linked chain with a pending pool and a
//!   proof-of-work sealing step. Reads reflect sealed blocks only.
//! - [`ContractLedger`]: account-based contract state with owner access
//!   control. Every call is applied immediately.
//!
//! The backend is chosen at configuration time by [`backend::open_backend`].

pub mod backend;
mod chain;
mod contract;

pub use chain::{verify_chain, SimulatedLedger};
pub use contract::{ContractError, ContractEvent, ContractInfo, ContractLedger, EventKind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::address::Address;
use crate::block::{Block, BlockSummary};
use crate::hashing::Hash256;
use crate::transaction::Transaction;

/// Largest amount a single transaction or balance may hold. Balances are
/// reported as `i64`, so every amount must fit in one.
pub const MAX_AMOUNT: u64 = i64::MAX as u64;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Amount {0} exceeds the largest allowed amount")]
    AmountTooLarge(u64),

    #[error("Balance of {0} would exceed the largest allowed amount")]
    BalanceOverflow(String),

    #[error("Sender and recipient are the same account: {0}")]
    SelfTransfer(String),

    #[error("Invalid account name '{name}': {reason}")]
    InvalidAccount { name: String, reason: &'static str },

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Account is frozen: {0}")]
    AccountFrozen(String),

    #[error("Insufficient balance for {account}: available {available}, requested {requested}")]
    InsufficientBalance {
        account: String,
        available: i64,
        requested: u64,
    },

    #[error("Chain integrity violated: {0}")]
    Integrity(String),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("Ledger backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Coarse failure category shared by every error in the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    Integrity,
    InsufficientBalance,
    BackendUnavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Integrity => "integrity",
            ErrorKind::InsufficientBalance => "insufficient balance",
            ErrorKind::BackendUnavailable => "backend unavailable",
        };
        f.write_str(s)
    }
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::ZeroAmount
            | LedgerError::AmountTooLarge(_)
            | LedgerError::BalanceOverflow(_)
            | LedgerError::SelfTransfer(_)
            | LedgerError::InvalidAccount { .. }
            | LedgerError::UnknownAccount(_) => ErrorKind::Validation,
            LedgerError::AccountFrozen(_) => ErrorKind::Authorization,
            LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::Integrity(_) => ErrorKind::Integrity,
            LedgerError::Contract(e) => e.kind(),
            LedgerError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
        }
    }

    /// Whether repeating the same call later could succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::BackendUnavailable
    }
}

/// Which ledger realization is in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Simulated,
    Contract,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Simulated => f.write_str("simulated"),
            BackendKind::Contract => f.write_str("contract"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" | "simulation" | "local" => Ok(BackendKind::Simulated),
            "contract" | "blockchain" => Ok(BackendKind::Contract),
            other => Err(format!("unknown ledger backend '{other}'")),
        }
    }
}

/// When mint and transfer seal the pending pool on the simulated backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SealPolicy {
    /// Seal a block right after each accepted mint or transfer
    #[default]
    Immediate,
    /// Leave transactions pooled until an explicit seal
    Manual,
}

impl FromStr for SealPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(SealPolicy::Immediate),
            "manual" => Ok(SealPolicy::Manual),
            other => Err(format!("unknown seal policy '{other}'")),
        }
    }
}

/// One transaction as seen from an account's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Block index (simulated) or call number (contract)
    pub position: u64,
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_transaction(position: u64, tx: &Transaction) -> Self {
        Self {
            position,
            sender: tx.sender.clone(),
            recipient: tx.recipient.clone(),
            amount: tx.amount,
            details: tx.details.clone(),
            timestamp: tx.timestamp,
        }
    }
}

/// Snapshot of the simulated chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainInfo {
    pub length: u64,
    pub tip_index: u64,
    pub tip_hash: Hash256,
    pub tip_timestamp: DateTime<Utc>,
    pub total_transactions: usize,
    pub pending_transactions: usize,
}

/// Backend-specific status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerSummary {
    Chain(ChainInfo),
    Contract(ContractInfo),
}

/// Borrowed view of a backend's persistent state
pub enum LedgerExport<'a> {
    Chain {
        chain: &'a [Block],
        pending: &'a [Transaction],
    },
    Contract(&'a ContractLedger),
}

/// Tip a detached proof search works against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealTarget {
    pub tip_index: u64,
    pub tip_hash: Hash256,
    pub last_proof: u64,
}

/// Capabilities shared by both ledger backends.
///
/// Accounts are addressed by name. Balances are signed so that a replayed
/// history which went negative is reported rather than hidden.
pub trait CreditLedger: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Make an account known to the ledger. The simulated backend accepts any
    /// valid name; the contract backend records the name↔address pair.
    fn register(&mut self, name: &str, address: Option<Address>) -> Result<(), LedgerError>;

    /// Append a raw transaction without balance checks.
    ///
    /// Returns the block index the transaction will land in, or the call
    /// number on the contract backend.
    fn submit(
        &mut self,
        sender: &str,
        recipient: &str,
        amount: u64,
        details: &str,
    ) -> Result<u64, LedgerError>;

    /// Create credit for `account`.
    fn mint(&mut self, account: &str, amount: u64, details: &str) -> Result<(), LedgerError>;

    /// Move credit between accounts after frozen and balance checks.
    fn transfer(
        &mut self,
        from: &str,
        to: &str,
        amount: u64,
        details: &str,
    ) -> Result<(), LedgerError>;

    fn set_frozen(&mut self, account: &str, frozen: bool) -> Result<(), LedgerError>;

    fn is_frozen(&self, account: &str) -> bool;

    fn balance(&self, account: &str) -> i64;

    /// Newest first, at most `limit` entries.
    fn history(&self, account: &str, limit: usize) -> Vec<HistoryEntry>;

    /// Make pending state durable in the ledger. Seals a block on the
    /// simulated backend; a no-op returning `None` on the contract backend.
    fn commit(&mut self) -> Result<Option<BlockSummary>, LedgerError>;

    /// Target for a proof search run outside the ledger lock.
    fn seal_target(&self) -> Option<SealTarget> {
        None
    }

    /// Commit a proof found for `target`. `Ok(None)` if the tip moved since
    /// the target was taken.
    fn commit_proof(
        &mut self,
        _target: &SealTarget,
        _proof: u64,
    ) -> Result<Option<BlockSummary>, LedgerError> {
        self.commit()
    }

    fn pending_count(&self) -> usize {
        0
    }

    /// Re-check the ledger's internal consistency.
    fn verify(&self) -> Result<(), LedgerError>;

    fn summary(&self) -> LedgerSummary;

    fn export(&self) -> LedgerExport<'_>;
}
