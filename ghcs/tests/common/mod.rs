// Copyright (c) 2024 Botho Foundation
//
//! Common test utilities for integration tests.
//!
//! Builds a node in a temporary directory with a small, fixed set of users:
//! one producer holding the genesis allocation, one factory, a state
//! verifier and a government account.

#![allow(dead_code)]

use std::path::PathBuf;

use ghcs::account::Role;
use ghcs::config::{AccountSeed, Config, GenesisAllocation};
use ghcs::ledger::{BackendKind, SealPolicy};
use ghcs::node::Node;
use tempfile::TempDir;

pub const PRODUCER: &str = "ProducerA";
pub const FACTORY: &str = "FactoryB";
pub const VERIFIER: &str = "StatePoll";
pub const GOVERNMENT: &str = "GovtAdmin";

pub const GENESIS_AMOUNT: u64 = 1000;

pub const BACKENDS: [BackendKind; 2] = [BackendKind::Simulated, BackendKind::Contract];

fn seed(name: &str, role: Role) -> AccountSeed {
    AccountSeed {
        name: name.to_string(),
        role,
        capacity: None,
        address: None,
    }
}

pub fn test_config(backend: BackendKind, policy: SealPolicy) -> Config {
    let mut config = Config::default();
    config.ledger.backend = backend;
    config.ledger.seal_policy = policy;
    config.ledger.fallback_to_simulated = false;
    config.accounts = vec![
        seed(PRODUCER, Role::Producer),
        seed(FACTORY, Role::Factory),
        seed(VERIFIER, Role::StateVerifier),
        seed(GOVERNMENT, Role::Government),
    ];
    config.genesis = vec![GenesisAllocation {
        account: PRODUCER.to_string(),
        amount: GENESIS_AMOUNT,
    }];
    config
}

/// A node living in its own temporary directory
pub struct TestNode {
    pub dir: TempDir,
    pub config: Config,
    pub node: Node,
}

impl TestNode {
    pub fn start(backend: BackendKind, policy: SealPolicy) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let config = test_config(backend, policy);
        let node = Node::open(&config, &dir.path().join("config.toml")).expect("open node");
        Self { dir, config, node }
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    pub fn data_file(&self) -> PathBuf {
        self.config.data_file_path(&self.config_path())
    }

    /// Drop the node and open it again from disk.
    pub fn reopen(self) -> Self {
        let Self { dir, config, node } = self;
        drop(node);
        let node = Node::open(&config, &dir.path().join("config.toml")).expect("reopen node");
        Self { dir, config, node }
    }
}
