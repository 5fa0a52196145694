// Copyright (c) 2024 Botho Foundation

//! Persisted state document.
//!
//! The whole application state lives in one JSON document:
//!
//! ```json
//! {
//!   "users": { "<name>": { "role": "Producer", "frozen": false, ... } },
//!   "blockchain": { "chain": [...], "current_transactions": [...] },
//!   "pending_issuances": { "ISSUE-1": { ... } },
//!   "quotas": { "<name>": 500 },
//!   "issuance_counter": 1
//! }
//! ```
//!
//! Writes go to a sibling temp file which is then renamed over the target,
//! so a crash never leaves a half-written document behind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::account::UserRecord;
use crate::block::Block;
use crate::config::{AccountSeed, GenesisAllocation};
use crate::issuance::{IssuanceId, IssuanceRequest};
use crate::ledger::{LedgerError, SealPolicy, SimulatedLedger};
use crate::transaction::{Transaction, NETWORK_SENDER};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed state document {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid seed data: {0}")]
    Seed(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDocument {
    pub chain: Vec<Block>,
    #[serde(default)]
    pub current_transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
    pub blockchain: ChainDocument,
    #[serde(default)]
    pub pending_issuances: BTreeMap<IssuanceId, IssuanceRequest>,
    #[serde(default)]
    pub quotas: BTreeMap<String, u64>,
    #[serde(default)]
    pub issuance_counter: u64,
}

impl StateDocument {
    /// Fresh document: genesis block, seed users, and the genesis allocations
    /// sealed into block 2.
    pub fn genesis(
        accounts: &[AccountSeed],
        allocations: &[GenesisAllocation],
    ) -> Result<Self, StoreError> {
        let mut users = BTreeMap::new();
        for seed in accounts {
            let mut record = UserRecord::new(seed.role);
            record.capacity = seed.capacity;
            record.address = seed.address;
            if users.insert(seed.name.clone(), record).is_some() {
                return Err(StoreError::Seed(format!(
                    "account '{}' is listed twice",
                    seed.name
                )));
            }
        }

        let mut ledger = SimulatedLedger::new(SealPolicy::Manual);
        for allocation in allocations {
            if !users.contains_key(&allocation.account) {
                return Err(StoreError::Seed(format!(
                    "genesis allocation names unknown account '{}'",
                    allocation.account
                )));
            }
            ledger.add_transaction(
                NETWORK_SENDER,
                &allocation.account,
                allocation.amount,
                "Genesis allocation",
            )?;
        }
        if !allocations.is_empty() {
            ledger.seal_block();
        }

        info!(
            accounts = users.len(),
            allocations = allocations.len(),
            blocks = ledger.chain().len(),
            "Created genesis state"
        );
        Ok(Self {
            users,
            blockchain: ChainDocument {
                chain: ledger.chain().to_vec(),
                current_transactions: Vec::new(),
            },
            pending_issuances: BTreeMap::new(),
            quotas: BTreeMap::new(),
            issuance_counter: 0,
        })
    }

    /// Read a document. `Ok(None)` if the file does not exist.
    ///
    /// The chain is verified on the way in; a broken chain is an error and
    /// is never repaired.
    pub fn load(path: &Path) -> Result<Option<Self>, StoreError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let doc: StateDocument =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        crate::ledger::verify_chain(&doc.blockchain.chain)?;
        if let Some(tx) = doc
            .blockchain
            .current_transactions
            .iter()
            .find(|tx| !tx.verify_hash())
        {
            return Err(LedgerError::Integrity(format!(
                "pending transaction {} does not match its content",
                tx.hash
            ))
            .into());
        }

        debug!(
            path = %path.display(),
            blocks = doc.blockchain.chain.len(),
            users = doc.users.len(),
            "Loaded state document"
        );
        Ok(Some(doc))
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        write_json_atomic(path, self).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Saved state document");
        Ok(())
    }
}

/// Borrowed view of live state, serialized in the same layout as
/// [`StateDocument`].
#[derive(Debug, Serialize)]
pub struct StateSnapshot<'a> {
    pub users: &'a BTreeMap<String, UserRecord>,
    pub blockchain: ChainSnapshot<'a>,
    pub pending_issuances: BTreeMap<IssuanceId, &'a IssuanceRequest>,
    pub quotas: &'a BTreeMap<String, u64>,
    pub issuance_counter: u64,
}

#[derive(Debug, Serialize)]
pub struct ChainSnapshot<'a> {
    pub chain: &'a [Block],
    pub current_transactions: &'a [Transaction],
}

impl StateSnapshot<'_> {
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        write_json_atomic(path, self).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            path = %path.display(),
            blocks = self.blockchain.chain.len(),
            "Saved state document"
        );
        Ok(())
    }
}

/// Pretty-print `value` as JSON into `path` via a temp file and rename.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut file = fs::File::create(&tmp)?;
    file.write_all(&json)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Role;
    use crate::ledger::ErrorKind;
    use tempfile::tempdir;

    fn seeds() -> Vec<AccountSeed> {
        vec![
            AccountSeed {
                name: "ProducerA".into(),
                role: Role::Producer,
                capacity: Some(2000),
                address: None,
            },
            AccountSeed {
                name: "FactoryB".into(),
                role: Role::Factory,
                capacity: None,
                address: None,
            },
        ]
    }

    fn allocations() -> Vec<GenesisAllocation> {
        vec![GenesisAllocation {
            account: "ProducerA".into(),
            amount: 1000,
        }]
    }

    #[test]
    fn test_genesis_seals_allocations_into_block_two() {
        let doc = StateDocument::genesis(&seeds(), &allocations()).unwrap();
        assert_eq!(doc.blockchain.chain.len(), 2);
        let block = &doc.blockchain.chain[1];
        assert_eq!(block.index, 2);
        assert_eq!(block.transactions[0].sender, NETWORK_SENDER);
        assert_eq!(block.transactions[0].amount, 1000);
        assert_eq!(doc.users["ProducerA"].capacity, Some(2000));
    }

    #[test]
    fn test_genesis_without_allocations_is_one_block() {
        let doc = StateDocument::genesis(&seeds(), &[]).unwrap();
        assert_eq!(doc.blockchain.chain.len(), 1);
    }

    #[test]
    fn test_genesis_rejects_unknown_allocation() {
        let bad = vec![GenesisAllocation {
            account: "Ghost".into(),
            amount: 1,
        }];
        assert!(matches!(
            StateDocument::genesis(&seeds(), &bad),
            Err(StoreError::Seed(_))
        ));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("ghcs_data.json");
        let doc = StateDocument::genesis(&seeds(), &allocations()).unwrap();
        doc.save(&path).unwrap();

        let loaded = StateDocument::load(&path).unwrap().unwrap();
        assert_eq!(loaded, doc);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_snapshot_matches_document_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ghcs_data.json");
        let doc = StateDocument::genesis(&seeds(), &allocations()).unwrap();
        let snapshot = StateSnapshot {
            users: &doc.users,
            blockchain: ChainSnapshot {
                chain: &doc.blockchain.chain,
                current_transactions: &doc.blockchain.current_transactions,
            },
            pending_issuances: BTreeMap::new(),
            quotas: &doc.quotas,
            issuance_counter: doc.issuance_counter,
        };
        snapshot.save(&path).unwrap();
        assert_eq!(StateDocument::load(&path).unwrap().unwrap(), doc);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempdir().unwrap();
        assert!(StateDocument::load(&dir.path().join("absent.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_tampered_chain_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ghcs_data.json");
        let mut doc = StateDocument::genesis(&seeds(), &allocations()).unwrap();
        doc.blockchain.chain[1].transactions[0].amount = 1_000_000;
        doc.save(&path).unwrap();

        match StateDocument::load(&path) {
            Err(StoreError::Ledger(e)) => assert_eq!(e.kind(), ErrorKind::Integrity),
            other => panic!("expected integrity error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ghcs_data.json");
        fs::write(&path, "[]").unwrap();
        assert!(matches!(
            StateDocument::load(&path),
            Err(StoreError::Malformed { .. })
        ));
    }
}
