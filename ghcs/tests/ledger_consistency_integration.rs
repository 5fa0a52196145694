// Copyright (c) 2024 Botho Foundation
//
//! Ledger consistency integration tests.
//!
//! - Conservation of credit under arbitrary transfer sequences
//! - History ordering and prefix property
//! - Tamper detection on reload
//! - Raw submissions pooled until sealed

mod common;

use proptest::prelude::*;
use std::fs;

use common::*;
use ghcs::address::Address;
use ghcs::ledger::{
    BackendKind, ContractLedger, CreditLedger, ErrorKind, SealPolicy, SimulatedLedger, MAX_AMOUNT,
};
use ghcs::node::Node;
use ghcs::store::StateDocument;

// ============================================================================
// Helpers
// ============================================================================

const ACCOUNTS: [&str; 4] = ["alice", "bob", "carol", "dave"];

fn simulated() -> Box<dyn CreditLedger> {
    Box::new(SimulatedLedger::new(SealPolicy::Manual))
}

fn contract() -> Box<dyn CreditLedger> {
    Box::new(ContractLedger::deploy(Address::derive_from_name("operator")))
}

/// Register the accounts and give each one `initial` credits.
fn seed(ledger: &mut dyn CreditLedger, initial: u64) {
    for name in ACCOUNTS {
        ledger.register(name, None).unwrap();
        ledger.mint(name, initial, "seed").unwrap();
    }
    ledger.commit().unwrap();
}

fn total(ledger: &dyn CreditLedger) -> i64 {
    ACCOUNTS.iter().map(|a| ledger.balance(a)).sum()
}

fn transfers() -> impl Strategy<Value = Vec<(usize, usize, u64)>> {
    prop::collection::vec((0..ACCOUNTS.len(), 0..ACCOUNTS.len(), 0u64..400), 1..40)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_transfers_conserve_credit(ops in transfers()) {
        for mut ledger in [simulated(), contract()] {
            seed(ledger.as_mut(), 500);
            for &(from, to, amount) in &ops {
                let before = total(ledger.as_ref());
                let result = ledger.transfer(ACCOUNTS[from], ACCOUNTS[to], amount, "");
                if let Err(e) = &result {
                    prop_assert!(matches!(
                        e.kind(),
                        ErrorKind::Validation | ErrorKind::InsufficientBalance
                    ));
                }
                prop_assert_eq!(total(ledger.as_ref()), before);
            }
            ledger.commit().unwrap();

            prop_assert_eq!(total(ledger.as_ref()), 500 * ACCOUNTS.len() as i64);
            for name in ACCOUNTS {
                prop_assert!(ledger.balance(name) >= 0);
            }
            ledger.verify().unwrap();
        }
    }

    #[test]
    fn test_history_is_prefix_of_longer_history(ops in transfers(), k in 0usize..10) {
        for mut ledger in [simulated(), contract()] {
            seed(ledger.as_mut(), 500);
            for &(from, to, amount) in &ops {
                let _ = ledger.transfer(ACCOUNTS[from], ACCOUNTS[to], amount, "");
            }
            ledger.commit().unwrap();

            for name in ACCOUNTS {
                let full = ledger.history(name, usize::MAX);
                let short = ledger.history(name, k);
                prop_assert_eq!(short.len(), k.min(full.len()));
                prop_assert_eq!(&full[..short.len()], &short[..]);
                prop_assert!(full.windows(2).all(|w| w[0].position >= w[1].position));
            }
        }
    }
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_tampered_state_document_is_rejected() {
    let t = TestNode::start(BackendKind::Simulated, SealPolicy::Immediate);
    let data_file = t.data_file();
    let config = t.config.clone();
    let config_path = t.config_path();

    let mut doc = StateDocument::load(&data_file).unwrap().unwrap();
    doc.blockchain.chain[1].transactions[0].amount = 1_000_000;
    fs::write(&data_file, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();

    let err = Node::open(&config, &config_path).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Integrity);
}

#[test]
fn test_relinked_block_is_rejected() {
    let mut t = TestNode::start(BackendKind::Simulated, SealPolicy::Immediate);
    t.node.purchase(FACTORY, PRODUCER, 10).unwrap();
    let data_file = t.data_file();

    let mut doc = StateDocument::load(&data_file).unwrap().unwrap();
    doc.blockchain.chain.remove(1);
    fs::write(&data_file, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();

    let err = Node::open(&t.config, &t.config_path()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Integrity);
}

#[test]
fn test_oversized_amounts_are_rejected() {
    for mut ledger in [simulated(), contract()] {
        let backend = ledger.backend();
        seed(ledger.as_mut(), 100);

        assert!(ledger.transfer("alice", "bob", u64::MAX, "").is_err(), "{backend}");
        assert!(ledger.transfer("alice", "bob", MAX_AMOUNT, "").is_err(), "{backend}");
        assert!(ledger.mint("alice", u64::MAX, "").is_err(), "{backend}");
        let err = ledger.mint("alice", MAX_AMOUNT, "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{backend}: {err}");
        ledger.commit().unwrap();

        assert_eq!(ledger.balance("alice"), 100, "{backend}");
        assert_eq!(ledger.balance("bob"), 100, "{backend}");
        assert_eq!(total(ledger.as_ref()), 400, "{backend}");
        ledger.verify().unwrap();
    }
}

#[test]
fn test_oversized_purchase_leaves_balances() {
    for backend in BACKENDS {
        let mut t = TestNode::start(backend, SealPolicy::Immediate);
        let err = t.node.purchase(FACTORY, PRODUCER, u64::MAX).unwrap_err();
        assert_ne!(err.kind(), ErrorKind::Integrity, "{backend}: {err}");

        let t = t.reopen();
        assert_eq!(t.node.balance(FACTORY).unwrap(), 0, "{backend}");
        assert_eq!(t.node.balance(PRODUCER).unwrap(), 1000, "{backend}");
        t.node.verify().unwrap();
    }
}

#[test]
fn test_submitted_transactions_wait_for_seal() {
    let mut t = TestNode::start(BackendKind::Simulated, SealPolicy::Immediate);
    let position = t.node.submit(PRODUCER, FACTORY, 25, "raw").unwrap();
    assert_eq!(position, 3);
    assert_eq!(t.node.balance(FACTORY).unwrap(), 0);

    let mut t = t.reopen();
    assert_eq!(t.node.status().unwrap().pending_transactions, 1);

    let block = t.node.seal().unwrap().unwrap();
    assert_eq!(block.index, 3);
    assert_eq!(t.node.balance(FACTORY).unwrap(), 25);

    let history = t.node.history(FACTORY, 10).unwrap();
    assert_eq!(history[0].details, "raw");
    assert_eq!(history[0].position, 3);
}

#[test]
fn test_contract_state_matches_after_reopen() {
    let mut t = TestNode::start(BackendKind::Contract, SealPolicy::Immediate);
    t.node.purchase(FACTORY, PRODUCER, 120).unwrap();
    t.node.set_frozen(ghcs::account::Role::Government, FACTORY, true).unwrap();

    let t = t.reopen();
    assert_eq!(t.node.balance(FACTORY).unwrap(), 120);
    assert!(t.node.is_frozen(FACTORY).unwrap());
    t.node.verify().unwrap();

    let history = t.node.history(FACTORY, 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sender, PRODUCER);
}
