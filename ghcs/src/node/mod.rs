// Copyright (c) 2024 Botho Foundation

//! The node: one owned ledger, the issuance workflow, the user registry and
//! quotas, persisted after every change.
//!
//! The node is the single writer. The ledger sits behind a `RwLock` so a
//! proof search can run on a worker thread against a snapshot of the tip
//! while readers keep seeing the last sealed state.

pub mod sealer;

pub use sealer::Sealer;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{info, warn};

use crate::account::{validate_account_name, Role, UserRecord};
use crate::address::Address;
use crate::block::BlockSummary;
use crate::config::Config;
use crate::issuance::{
    Decision, IssuanceAction, IssuanceError, IssuanceId, IssuanceRequest, IssuanceStatus,
    IssuanceWorkflow,
};
use crate::ledger::backend::{
    deploy_contract, open_backend, save_contract, BackendOptions, CONTRACT_OPERATOR,
};
use crate::ledger::{
    BackendKind, ContractLedger, CreditLedger, ErrorKind, HistoryEntry, LedgerError, LedgerExport,
    LedgerSummary, SealPolicy, SimulatedLedger,
};
use crate::store::{ChainDocument, ChainSnapshot, StateDocument, StateSnapshot, StoreError};

/// Shared ledger handle
pub type SharedLedger = Arc<RwLock<Box<dyn CreditLedger>>>;

/// Proof searches that may be discarded because the tip moved
const MAX_SEAL_ATTEMPTS: usize = 3;

const MIGRATION_DETAILS: &str = "Migrated balance from simulated ledger";

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("User already exists: {0}")]
    DuplicateUser(String),

    #[error("Invalid user name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("{role} may not {action}")]
    NotPermitted { role: Role, action: &'static str },

    #[error("{account} has a quota of {quota}, requested {requested}")]
    QuotaExceeded {
        account: String,
        quota: u64,
        requested: u64,
    },

    #[error("Proof search was cancelled")]
    SealCancelled,

    #[error("Ledger lock poisoned")]
    LockPoisoned,

    #[error("Only the simulated ledger can be migrated; this node runs the {0} backend")]
    NotSimulated(BackendKind),

    #[error("{0} transactions are still pending; seal them before migrating")]
    UnsealedTransactions(usize),

    #[error("A contract deployment already exists at {}", .0.display())]
    ContractExists(PathBuf),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Issuance(#[from] IssuanceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl NodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NodeError::UnknownUser(_)
            | NodeError::DuplicateUser(_)
            | NodeError::InvalidName { .. }
            | NodeError::ZeroAmount
            | NodeError::NotSimulated(_)
            | NodeError::UnsealedTransactions(_)
            | NodeError::ContractExists(_) => ErrorKind::Validation,
            NodeError::NotPermitted { .. } | NodeError::QuotaExceeded { .. } => {
                ErrorKind::Authorization
            }
            NodeError::SealCancelled => ErrorKind::BackendUnavailable,
            NodeError::LockPoisoned => ErrorKind::Integrity,
            NodeError::Ledger(e) => e.kind(),
            NodeError::Issuance(e) => e.kind(),
            NodeError::Store(StoreError::Ledger(e)) => e.kind(),
            NodeError::Store(_) => ErrorKind::BackendUnavailable,
        }
    }
}

/// Summary for `status`
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub backend: BackendKind,
    pub seal_policy: SealPolicy,
    pub users: usize,
    pub frozen_users: Vec<String>,
    pub active_requests: usize,
    pub pending_transactions: usize,
    pub ledger: LedgerSummary,
    pub data_file: PathBuf,
}

/// What [`Node::migrate_to_contract`] moved
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub contract: Address,
    pub registered: usize,
    /// Non-zero balances issued on the contract, by account name
    pub balances: Vec<(String, u64)>,
    pub frozen: Vec<String>,
    /// Issuance requests carried over unchanged
    pub requests: usize,
}

impl MigrationReport {
    pub fn total_credits(&self) -> u64 {
        self.balances.iter().map(|(_, amount)| amount).sum()
    }
}

pub struct Node {
    ledger: SharedLedger,
    workflow: IssuanceWorkflow,
    users: BTreeMap<String, UserRecord>,
    quotas: BTreeMap<String, u64>,
    /// Chain kept in the state document while another backend is active
    dormant_chain: ChainDocument,
    seal_policy: SealPolicy,
    data_file: PathBuf,
    contract_file: PathBuf,
    shutdown: Arc<AtomicBool>,
}

fn read_lock(
    ledger: &SharedLedger,
) -> Result<RwLockReadGuard<'_, Box<dyn CreditLedger>>, NodeError> {
    ledger.read().map_err(|_| NodeError::LockPoisoned)
}

fn write_lock(
    ledger: &SharedLedger,
) -> Result<RwLockWriteGuard<'_, Box<dyn CreditLedger>>, NodeError> {
    ledger.write().map_err(|_| NodeError::LockPoisoned)
}

impl Node {
    /// Open the node described by `config`.
    ///
    /// A missing state document is created from the configured seed accounts
    /// and genesis allocations; with the contract backend a fresh contract is
    /// deployed alongside it.
    pub fn open(config: &Config, config_path: &Path) -> Result<Self, NodeError> {
        let data_file = config.data_file_path(config_path);
        let options = config.backend_options(config_path);

        let doc = match StateDocument::load(&data_file)? {
            Some(doc) => doc,
            None => Self::create_state(config, &data_file, &options)?,
        };
        Self::from_document(doc, &options, config.ledger.seal_policy, data_file)
    }

    fn create_state(
        config: &Config,
        data_file: &Path,
        options: &BackendOptions,
    ) -> Result<StateDocument, NodeError> {
        info!(path = %data_file.display(), "No state document found, creating genesis state");
        let doc = StateDocument::genesis(&config.accounts, &config.genesis)?;
        if options.kind == BackendKind::Contract && !options.contract_file.exists() {
            let contract = deploy_contract(&config.accounts, &config.genesis)?;
            save_contract(&options.contract_file, &contract)?;
        }
        doc.save(data_file)?;
        Ok(doc)
    }

    fn from_document(
        doc: StateDocument,
        options: &BackendOptions,
        seal_policy: SealPolicy,
        data_file: PathBuf,
    ) -> Result<Self, NodeError> {
        let StateDocument {
            users,
            blockchain,
            pending_issuances,
            quotas,
            issuance_counter,
        } = doc;

        let frozen: Vec<String> = users
            .iter()
            .filter(|(_, record)| record.frozen)
            .map(|(name, _)| name.clone())
            .collect();

        let mut chain_doc = Some(blockchain);
        let ledger = open_backend(options, || {
            let ChainDocument {
                chain,
                current_transactions,
            } = chain_doc.take().unwrap_or_default();
            SimulatedLedger::from_parts(chain, current_transactions, frozen, seal_policy)
        })?;
        let dormant_chain = chain_doc.unwrap_or_default();

        info!(
            backend = %ledger.backend(),
            users = users.len(),
            requests = pending_issuances.len(),
            "Node opened"
        );

        Ok(Self {
            ledger: Arc::new(RwLock::new(ledger)),
            workflow: IssuanceWorkflow::from_parts(
                pending_issuances.into_values(),
                issuance_counter,
            ),
            users,
            quotas,
            dormant_chain,
            seal_policy,
            data_file,
            contract_file: options.contract_file.clone(),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that cancels a running proof search when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn ledger(&self) -> SharedLedger {
        self.ledger.clone()
    }

    pub fn backend(&self) -> Result<BackendKind, NodeError> {
        Ok(read_lock(&self.ledger)?.backend())
    }

    pub fn users(&self) -> &BTreeMap<String, UserRecord> {
        &self.users
    }

    pub fn user(&self, name: &str) -> Result<&UserRecord, NodeError> {
        self.users
            .get(name)
            .ok_or_else(|| NodeError::UnknownUser(name.to_string()))
    }

    pub fn role_of(&self, name: &str) -> Result<Role, NodeError> {
        Ok(self.user(name)?.role)
    }

    pub fn quotas(&self) -> &BTreeMap<String, u64> {
        &self.quotas
    }

    /// Append a raw transaction. Returns the block index it will land in
    /// (or the call number on the contract backend).
    pub fn submit(
        &mut self,
        sender: &str,
        recipient: &str,
        amount: u64,
        details: &str,
    ) -> Result<u64, NodeError> {
        let position = write_lock(&self.ledger)?.submit(sender, recipient, amount, details)?;
        self.persist()?;
        Ok(position)
    }

    /// Seal pending transactions into a block.
    ///
    /// The proof search runs on a [`Sealer`] thread outside the write lock.
    /// Returns `None` on backends without blocks.
    pub fn seal(&mut self) -> Result<Option<BlockSummary>, NodeError> {
        for attempt in 1..=MAX_SEAL_ATTEMPTS {
            let target = read_lock(&self.ledger)?.seal_target();
            let Some(target) = target else {
                let summary = write_lock(&self.ledger)?.commit()?;
                self.persist()?;
                return Ok(summary);
            };

            let proof = Sealer::start(target, self.shutdown.clone())
                .wait()
                .ok_or(NodeError::SealCancelled)?;

            let committed = write_lock(&self.ledger)?.commit_proof(&target, proof)?;
            match committed {
                Some(summary) => {
                    self.persist()?;
                    return Ok(Some(summary));
                }
                None => warn!(attempt, "Tip moved during proof search, retrying"),
            }
        }
        Err(NodeError::SealCancelled)
    }

    pub fn balance(&self, account: &str) -> Result<i64, NodeError> {
        Ok(read_lock(&self.ledger)?.balance(account))
    }

    pub fn history(&self, account: &str, limit: usize) -> Result<Vec<HistoryEntry>, NodeError> {
        Ok(read_lock(&self.ledger)?.history(account, limit))
    }

    pub fn is_frozen(&self, account: &str) -> Result<bool, NodeError> {
        Ok(read_lock(&self.ledger)?.is_frozen(account))
    }

    pub fn request_issuance(
        &mut self,
        producer: &str,
        amount: u64,
    ) -> Result<IssuanceId, NodeError> {
        let role = self.role_of(producer)?;
        if role != Role::Producer {
            return Err(NodeError::NotPermitted {
                role,
                action: "request an issuance",
            });
        }
        self.check_quota(producer, amount)?;

        let id = {
            let ledger = read_lock(&self.ledger)?;
            self.workflow.request(producer, amount, &**ledger)?
        };
        self.persist()?;
        Ok(id)
    }

    pub fn decide_issuance(
        &mut self,
        id: IssuanceId,
        action: IssuanceAction,
        actor_role: Role,
    ) -> Result<Decision, NodeError> {
        let decision = {
            let mut ledger = write_lock(&self.ledger)?;
            self.workflow.decide(id, action, actor_role, &mut **ledger)?
        };
        self.persist()?;
        Ok(decision)
    }

    pub fn active_requests(&self) -> impl Iterator<Item = &IssuanceRequest> {
        self.workflow.active()
    }

    pub fn requests_with_status(
        &self,
        status: IssuanceStatus,
    ) -> impl Iterator<Item = &IssuanceRequest> {
        self.workflow.with_status(status)
    }

    pub fn issuance(&self, id: IssuanceId) -> Option<&IssuanceRequest> {
        self.workflow.get(id)
    }

    /// A factory buys credits from a seller.
    pub fn purchase(&mut self, buyer: &str, seller: &str, amount: u64) -> Result<(), NodeError> {
        let role = self.role_of(buyer)?;
        if role != Role::Factory {
            return Err(NodeError::NotPermitted {
                role,
                action: "purchase credits",
            });
        }
        self.user(seller)?;
        if amount == 0 {
            return Err(NodeError::ZeroAmount);
        }
        self.check_quota(buyer, amount)?;

        write_lock(&self.ledger)?.transfer(seller, buyer, amount, "Credit purchase")?;
        info!(buyer, seller, amount, "Purchase completed");
        self.persist()
    }

    pub fn set_frozen(
        &mut self,
        actor_role: Role,
        account: &str,
        frozen: bool,
    ) -> Result<(), NodeError> {
        if actor_role != Role::Government {
            return Err(NodeError::NotPermitted {
                role: actor_role,
                action: "freeze accounts",
            });
        }
        self.user(account)?;

        write_lock(&self.ledger)?.set_frozen(account, frozen)?;
        if let Some(record) = self.users.get_mut(account) {
            record.frozen = frozen;
        }
        self.persist()
    }

    pub fn set_quota(
        &mut self,
        actor_role: Role,
        account: &str,
        quota: u64,
    ) -> Result<(), NodeError> {
        if actor_role != Role::Government {
            return Err(NodeError::NotPermitted {
                role: actor_role,
                action: "set quotas",
            });
        }
        self.user(account)?;

        self.quotas.insert(account.to_string(), quota);
        info!(account, quota, "Quota set");
        self.persist()
    }

    pub fn register_user(
        &mut self,
        name: &str,
        role: Role,
        address: Option<Address>,
        capacity: Option<u64>,
    ) -> Result<(), NodeError> {
        validate_account_name(name).map_err(|reason| NodeError::InvalidName {
            name: name.to_string(),
            reason,
        })?;
        if self.users.contains_key(name) {
            return Err(NodeError::DuplicateUser(name.to_string()));
        }

        let backend = {
            let mut ledger = write_lock(&self.ledger)?;
            ledger.register(name, address)?;
            ledger.backend()
        };

        let mut record = UserRecord::new(role);
        record.capacity = capacity;
        record.address = match backend {
            BackendKind::Contract => {
                Some(address.unwrap_or_else(|| Address::derive_from_name(name)))
            }
            BackendKind::Simulated => address,
        };
        self.users.insert(name.to_string(), record);
        info!(name, %role, "User registered");
        self.persist()
    }

    /// Move the node from the simulated chain onto a freshly deployed
    /// contract.
    ///
    /// Every user is registered, each positive sealed balance is issued to
    /// its owner and frozen accounts are frozen again. The sealed chain is
    /// kept in the state document as history. Users, quotas and issuance
    /// requests carry over unchanged.
    pub fn migrate_to_contract(&mut self) -> Result<MigrationReport, NodeError> {
        let mut ledger = write_lock(&self.ledger)?;
        let backend = ledger.backend();
        if backend != BackendKind::Simulated {
            return Err(NodeError::NotSimulated(backend));
        }
        let pending = ledger.pending_count();
        if pending > 0 {
            return Err(NodeError::UnsealedTransactions(pending));
        }
        if self.contract_file.exists() {
            return Err(NodeError::ContractExists(self.contract_file.clone()));
        }

        let mut contract = ContractLedger::deploy(Address::derive_from_name(CONTRACT_OPERATOR));
        for (name, record) in &self.users {
            contract.register(name, record.address)?;
        }

        let mut balances = Vec::new();
        for name in self.users.keys() {
            let balance = ledger.balance(name);
            match u64::try_from(balance) {
                Ok(0) => {}
                Ok(amount) => {
                    contract.mint(name, amount, MIGRATION_DETAILS)?;
                    balances.push((name.clone(), amount));
                }
                Err(_) => warn!(account = %name, balance, "Negative balance not migrated"),
            }
        }

        let mut frozen = Vec::new();
        for (name, record) in &self.users {
            if record.frozen || ledger.is_frozen(name) {
                CreditLedger::set_frozen(&mut contract, name, true)?;
                frozen.push(name.clone());
            }
        }

        save_contract(&self.contract_file, &contract)?;

        if let LedgerExport::Chain { chain, pending } = ledger.export() {
            self.dormant_chain = ChainDocument {
                chain: chain.to_vec(),
                current_transactions: pending.to_vec(),
            };
        }
        for (name, record) in self.users.iter_mut() {
            record.address = contract.address_of(name);
        }

        let report = MigrationReport {
            contract: contract.address(),
            registered: self.users.len(),
            balances,
            frozen,
            requests: self.workflow.active().count(),
        };
        *ledger = Box::new(contract);
        drop(ledger);

        info!(
            contract = %report.contract,
            users = report.registered,
            credits = report.total_credits(),
            requests = report.requests,
            "Migrated simulated ledger to contract"
        );
        self.persist()?;
        Ok(report)
    }

    pub fn verify(&self) -> Result<(), NodeError> {
        read_lock(&self.ledger)?.verify()?;
        Ok(())
    }

    pub fn status(&self) -> Result<NodeStatus, NodeError> {
        let ledger = read_lock(&self.ledger)?;
        Ok(NodeStatus {
            backend: ledger.backend(),
            seal_policy: self.seal_policy,
            users: self.users.len(),
            frozen_users: self
                .users
                .iter()
                .filter(|(_, r)| r.frozen)
                .map(|(n, _)| n.clone())
                .collect(),
            active_requests: self.workflow.active().count(),
            pending_transactions: ledger.pending_count(),
            ledger: ledger.summary(),
            data_file: self.data_file.clone(),
        })
    }

    fn check_quota(&self, account: &str, amount: u64) -> Result<(), NodeError> {
        match self.quotas.get(account) {
            Some(&quota) if amount > quota => Err(NodeError::QuotaExceeded {
                account: account.to_string(),
                quota,
                requested: amount,
            }),
            _ => Ok(()),
        }
    }

    /// Write the state document (and the contract deployment, if active).
    pub fn persist(&self) -> Result<(), NodeError> {
        let ledger = read_lock(&self.ledger)?;
        let (chain, pending) = match ledger.export() {
            LedgerExport::Chain { chain, pending } => (chain, pending),
            LedgerExport::Contract(contract) => {
                save_contract(&self.contract_file, contract)?;
                (
                    self.dormant_chain.chain.as_slice(),
                    self.dormant_chain.current_transactions.as_slice(),
                )
            }
        };

        StateSnapshot {
            users: &self.users,
            blockchain: ChainSnapshot {
                chain,
                current_transactions: pending,
            },
            pending_issuances: self.workflow.active().map(|r| (r.id, r)).collect(),
            quotas: &self.quotas,
            issuance_counter: self.workflow.counter(),
        }
        .save(&self.data_file)?;
        Ok(())
    }
}
