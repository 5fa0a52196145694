// Copyright (c) 2024 Botho Foundation

//! Account-based credit contract.
//!
//! The contract keeps balances, frozen flags and a name↔address bijection.
//! The owner registers accounts, issues credit and freezes accounts; holders
//! move their own credit. Every successful mutation is stamped with a call
//! number and appended to the event log, which is the read-side history.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info};

use super::{
    BackendKind, CreditLedger, ErrorKind, HistoryEntry, LedgerError, LedgerExport, LedgerSummary,
    MAX_AMOUNT,
};
use crate::address::Address;
use crate::block::BlockSummary;
use crate::transaction::NETWORK_SENDER;

/// Return `$err` from the enclosing function unless `$cond` holds.
macro_rules! require {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("Caller is not authorized for this call")]
    Unauthorized,

    #[error("Account name already registered: {0}")]
    DuplicateName(String),

    #[error("Address already registered: {0}")]
    DuplicateAddress(Address),

    #[error("Invalid address")]
    InvalidAddress,

    #[error("Account name is empty")]
    EmptyName,

    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Account is frozen: {0}")]
    AccountFrozen(Address),

    #[error("Zero address is not a valid party")]
    ZeroAddress,

    #[error("Cannot transfer to the same account")]
    SelfTransfer,

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: u64, requested: u64 },

    #[error("The contract owner cannot be frozen")]
    CannotFreezeOwner,

    #[error("No account registered under '{0}'")]
    UnknownAccount(String),

    #[error("Amount overflows the total supply")]
    SupplyOverflow,
}

impl ContractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContractError::Unauthorized
            | ContractError::AccountFrozen(_)
            | ContractError::CannotFreezeOwner => ErrorKind::Authorization,
            ContractError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            _ => ErrorKind::Validation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum EventKind {
    CreditTransfer {
        from: Address,
        to: Address,
        amount: u64,
        details: String,
    },
    CreditIssuance {
        to: Address,
        amount: u64,
        details: String,
    },
    AccountFrozen {
        account: Address,
        frozen: bool,
    },
    AccountRegistered {
        account: Address,
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    /// Call number of the mutation that emitted this event
    pub call: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractInfo {
    pub address: Address,
    pub owner: Address,
    pub total_supply: u64,
    pub accounts: usize,
    pub last_call: u64,
}

/// Contract state. This is also the deployment document written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractLedger {
    address: Address,
    owner: Address,
    total_supply: u64,
    #[serde(default)]
    balances: BTreeMap<Address, u64>,
    #[serde(default)]
    frozen: BTreeSet<Address>,
    #[serde(default)]
    names: BTreeMap<String, Address>,
    #[serde(default)]
    addresses: BTreeMap<Address, String>,
    #[serde(default)]
    events: Vec<ContractEvent>,
    #[serde(default)]
    call_number: u64,
}

impl ContractLedger {
    /// Deploy a fresh contract owned by `owner`.
    pub fn deploy(owner: Address) -> Self {
        let address = Address::derive_contract(&owner, 0);
        info!(contract = %address, owner = %owner, "Contract deployed");
        Self {
            address,
            owner,
            total_supply: 0,
            balances: BTreeMap::new(),
            frozen: BTreeSet::new(),
            names: BTreeMap::new(),
            addresses: BTreeMap::new(),
            events: Vec::new(),
            call_number: 0,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn register_account(
        &mut self,
        caller: Address,
        account: Address,
        name: &str,
    ) -> Result<(), ContractError> {
        require!(caller == self.owner, ContractError::Unauthorized);
        require!(!account.is_zero(), ContractError::InvalidAddress);
        require!(!name.trim().is_empty(), ContractError::EmptyName);
        require!(
            !self.names.contains_key(name),
            ContractError::DuplicateName(name.to_string())
        );
        require!(
            !self.addresses.contains_key(&account),
            ContractError::DuplicateAddress(account)
        );

        self.names.insert(name.to_string(), account);
        self.addresses.insert(account, name.to_string());
        self.emit(EventKind::AccountRegistered {
            account,
            name: name.to_string(),
        });
        info!(%account, name, "Account registered");
        Ok(())
    }

    pub fn issue_credits(
        &mut self,
        caller: Address,
        to: Address,
        amount: u64,
        details: &str,
    ) -> Result<(), ContractError> {
        require!(caller == self.owner, ContractError::Unauthorized);
        require!(amount > 0, ContractError::ZeroAmount);
        require!(!to.is_zero(), ContractError::ZeroAddress);
        require!(!self.frozen.contains(&to), ContractError::AccountFrozen(to));

        // Every balance is bounded by the supply, which stays within MAX_AMOUNT.
        let total_supply = self
            .total_supply
            .checked_add(amount)
            .filter(|supply| *supply <= MAX_AMOUNT)
            .ok_or(ContractError::SupplyOverflow)?;
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(ContractError::SupplyOverflow)?;

        self.total_supply = total_supply;
        self.balances.insert(to, balance);
        self.emit(EventKind::CreditIssuance {
            to,
            amount,
            details: details.to_string(),
        });
        info!(%to, amount, total_supply, "Credits issued");
        Ok(())
    }

    pub fn transfer_credits(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        amount: u64,
        details: &str,
    ) -> Result<(), ContractError> {
        require!(caller == from, ContractError::Unauthorized);
        require!(!from.is_zero() && !to.is_zero(), ContractError::ZeroAddress);
        require!(from != to, ContractError::SelfTransfer);
        require!(amount > 0, ContractError::ZeroAmount);
        require!(!self.frozen.contains(&from), ContractError::AccountFrozen(from));
        require!(!self.frozen.contains(&to), ContractError::AccountFrozen(to));

        let available = self.balance_of(from);
        require!(
            available >= amount,
            ContractError::InsufficientBalance {
                available,
                requested: amount
            }
        );
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(ContractError::SupplyOverflow)?;

        // Both sides are computed before either is written.
        self.balances.insert(from, available - amount);
        self.balances.insert(to, credited);
        self.emit(EventKind::CreditTransfer {
            from,
            to,
            amount,
            details: details.to_string(),
        });
        info!(%from, %to, amount, "Credits transferred");
        Ok(())
    }

    pub fn set_frozen(
        &mut self,
        caller: Address,
        account: Address,
        frozen: bool,
    ) -> Result<(), ContractError> {
        require!(caller == self.owner, ContractError::Unauthorized);
        require!(!account.is_zero(), ContractError::InvalidAddress);
        require!(account != self.owner, ContractError::CannotFreezeOwner);

        if frozen {
            self.frozen.insert(account);
        } else {
            self.frozen.remove(&account);
        }
        self.emit(EventKind::AccountFrozen { account, frozen });
        info!(%account, frozen, "Account freeze state changed");
        Ok(())
    }

    pub fn balance_of(&self, account: Address) -> u64 {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.names.get(name).copied()
    }

    pub fn name_of(&self, account: Address) -> Option<&str> {
        self.addresses.get(&account).map(String::as_str)
    }

    pub fn is_frozen(&self, account: Address) -> bool {
        self.frozen.contains(&account)
    }

    pub fn contract_info(&self) -> ContractInfo {
        ContractInfo {
            address: self.address,
            owner: self.owner,
            total_supply: self.total_supply,
            accounts: self.names.len(),
            last_call: self.call_number,
        }
    }

    pub fn events(&self) -> &[ContractEvent] {
        &self.events
    }

    /// Transfers from or to `account` and issuances to it, newest first.
    pub fn history_of(
        &self,
        account: Address,
        limit: usize,
    ) -> impl Iterator<Item = &ContractEvent> + '_ {
        self.events
            .iter()
            .rev()
            .filter(move |event| match &event.kind {
                EventKind::CreditTransfer { from, to, .. } => *from == account || *to == account,
                EventKind::CreditIssuance { to, .. } => *to == account,
                _ => false,
            })
            .take(limit)
    }

    /// Check that stored balances add up to the total supply, the name and
    /// address maps mirror each other, and call numbers only increase.
    pub fn check_consistency(&self) -> Result<(), LedgerError> {
        let sum = self
            .balances
            .values()
            .try_fold(0u64, |acc, b| acc.checked_add(*b));
        if sum != Some(self.total_supply) {
            return Err(LedgerError::Integrity(format!(
                "balances sum to {:?}, total supply is {}",
                sum, self.total_supply
            )));
        }
        if self.total_supply > MAX_AMOUNT {
            return Err(LedgerError::Integrity(format!(
                "total supply {} exceeds the largest allowed amount",
                self.total_supply
            )));
        }
        if self.names.len() != self.addresses.len()
            || self
                .names
                .iter()
                .any(|(name, addr)| self.addresses.get(addr) != Some(name))
        {
            return Err(LedgerError::Integrity(
                "name and address registries disagree".into(),
            ));
        }
        let mut last = 0;
        for event in &self.events {
            if event.call <= last {
                return Err(LedgerError::Integrity(format!(
                    "event call number {} does not follow {}",
                    event.call, last
                )));
            }
            last = event.call;
        }
        if last > self.call_number {
            return Err(LedgerError::Integrity(format!(
                "event call number {} is ahead of the contract ({})",
                last, self.call_number
            )));
        }
        Ok(())
    }

    fn emit(&mut self, kind: EventKind) {
        self.call_number += 1;
        debug!(call = self.call_number, ?kind, "Contract event");
        self.events.push(ContractEvent {
            call: self.call_number,
            timestamp: Utc::now().trunc_subsecs(3),
            kind,
        });
    }

    fn resolve(&self, name: &str) -> Result<Address, ContractError> {
        self.address_of(name)
            .ok_or_else(|| ContractError::UnknownAccount(name.to_string()))
    }

    fn display_name(&self, account: Address) -> String {
        self.name_of(account)
            .map(str::to_string)
            .unwrap_or_else(|| account.to_string())
    }

    fn history_entry(&self, event: &ContractEvent) -> Option<HistoryEntry> {
        let (sender, recipient, amount, details) = match &event.kind {
            EventKind::CreditTransfer {
                from,
                to,
                amount,
                details,
            } => (self.display_name(*from), self.display_name(*to), *amount, details),
            EventKind::CreditIssuance {
                to,
                amount,
                details,
            } => (NETWORK_SENDER.to_string(), self.display_name(*to), *amount, details),
            _ => return None,
        };
        Some(HistoryEntry {
            position: event.call,
            sender,
            recipient,
            amount,
            details: details.clone(),
            timestamp: event.timestamp,
        })
    }
}

impl CreditLedger for ContractLedger {
    fn backend(&self) -> BackendKind {
        BackendKind::Contract
    }

    fn register(&mut self, name: &str, address: Option<Address>) -> Result<(), LedgerError> {
        let address = address.unwrap_or_else(|| Address::derive_from_name(name));
        if self.address_of(name) == Some(address) {
            return Ok(());
        }
        if name == NETWORK_SENDER {
            return Err(LedgerError::InvalidAccount {
                name: name.to_string(),
                reason: "account name is reserved",
            });
        }
        let owner = self.owner;
        Ok(self.register_account(owner, address, name)?)
    }

    /// Contract calls take effect at once, so a submitted transaction is
    /// executed immediately and the call number is returned.
    fn submit(
        &mut self,
        sender: &str,
        recipient: &str,
        amount: u64,
        details: &str,
    ) -> Result<u64, LedgerError> {
        if sender == NETWORK_SENDER {
            self.mint(recipient, amount, details)?;
        } else {
            self.transfer(sender, recipient, amount, details)?;
        }
        Ok(self.call_number)
    }

    fn mint(&mut self, account: &str, amount: u64, details: &str) -> Result<(), LedgerError> {
        let to = self.resolve(account)?;
        let owner = self.owner;
        Ok(self.issue_credits(owner, to, amount, details)?)
    }

    fn transfer(
        &mut self,
        from: &str,
        to: &str,
        amount: u64,
        details: &str,
    ) -> Result<(), LedgerError> {
        if from == to {
            return Err(LedgerError::SelfTransfer(from.to_string()));
        }
        let from_addr = self.resolve(from)?;
        let to_addr = self.resolve(to)?;
        self.transfer_credits(from_addr, from_addr, to_addr, amount, details)
            .map_err(|e| match e {
                ContractError::InsufficientBalance {
                    available,
                    requested,
                } => LedgerError::InsufficientBalance {
                    account: from.to_string(),
                    available: i64::try_from(available).unwrap_or(i64::MAX),
                    requested,
                },
                other => LedgerError::Contract(other),
            })
    }

    fn set_frozen(&mut self, account: &str, frozen: bool) -> Result<(), LedgerError> {
        let address = self.resolve(account)?;
        let owner = self.owner;
        Ok(ContractLedger::set_frozen(self, owner, address, frozen)?)
    }

    fn is_frozen(&self, account: &str) -> bool {
        self.address_of(account)
            .map(|a| ContractLedger::is_frozen(self, a))
            .unwrap_or(false)
    }

    fn balance(&self, account: &str) -> i64 {
        self.address_of(account)
            .map(|a| i64::try_from(self.balance_of(a)).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }

    fn history(&self, account: &str, limit: usize) -> Vec<HistoryEntry> {
        let Some(address) = self.address_of(account) else {
            return Vec::new();
        };
        self.history_of(address, limit)
            .filter_map(|event| self.history_entry(event))
            .collect()
    }

    fn commit(&mut self) -> Result<Option<BlockSummary>, LedgerError> {
        Ok(None)
    }

    fn verify(&self) -> Result<(), LedgerError> {
        self.check_consistency()
    }

    fn summary(&self) -> LedgerSummary {
        LedgerSummary::Contract(self.contract_info())
    }

    fn export(&self) -> LedgerExport<'_> {
        LedgerExport::Contract(self)
    }
}
