// Copyright (c) 2024 Botho Foundation
//
//! Credit lifecycle integration tests.
//!
//! Runs the full producer → verifier → factory flow against both ledger
//! backends:
//! - genesis allocation
//! - issuance request, scrutiny and certification
//! - factory purchase
//! - government freeze blocking further transfers

mod common;

use common::*;
use ghcs::account::Role;
use ghcs::issuance::{IssuanceAction, IssuanceStatus};
use ghcs::ledger::{BackendKind, CreditLedger, ErrorKind, SealPolicy};
use ghcs::node::NodeError;

#[test]
fn test_credit_lifecycle_on_both_backends() {
    for backend in BACKENDS {
        let mut t = TestNode::start(backend, SealPolicy::Immediate);
        let node = &mut t.node;
        assert_eq!(node.balance(PRODUCER).unwrap(), 1000, "{backend}");

        let id = node.request_issuance(PRODUCER, 500).unwrap();
        assert_eq!(id.to_string(), "ISSUE-1");
        assert_eq!(
            node.issuance(id).unwrap().status,
            IssuanceStatus::PendingVerification
        );
        assert_eq!(node.balance(PRODUCER).unwrap(), 1000);

        let decision = node
            .decide_issuance(id, IssuanceAction::Certify, Role::StateVerifier)
            .unwrap();
        assert_eq!(decision.status, IssuanceStatus::Certified);
        assert_eq!(node.balance(PRODUCER).unwrap(), 1500);
        assert!(node.issuance(id).is_none());
        assert_eq!(node.active_requests().count(), 0);

        node.purchase(FACTORY, PRODUCER, 300).unwrap();
        assert_eq!(node.balance(PRODUCER).unwrap(), 1200);
        assert_eq!(node.balance(FACTORY).unwrap(), 300);

        node.set_frozen(Role::Government, PRODUCER, true).unwrap();
        let err = node.purchase(FACTORY, PRODUCER, 100).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization, "{backend}: {err}");

        let ledger = node.ledger();
        let err = ledger
            .write()
            .unwrap()
            .transfer(PRODUCER, FACTORY, 10, "")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        assert_eq!(node.balance(PRODUCER).unwrap(), 1200);
        assert_eq!(node.balance(FACTORY).unwrap(), 300);
        node.verify().unwrap();
    }
}

#[test]
fn test_scrutiny_path_requires_government() {
    for backend in BACKENDS {
        let mut t = TestNode::start(backend, SealPolicy::Immediate);
        let node = &mut t.node;
        let id = node.request_issuance(PRODUCER, 200).unwrap();

        let err = node
            .decide_issuance(id, IssuanceAction::Certify, Role::Government)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let decision = node
            .decide_issuance(id, IssuanceAction::Scrutinize, Role::StateVerifier)
            .unwrap();
        assert_eq!(decision.status, IssuanceStatus::UnderScrutiny);

        let err = node
            .decide_issuance(id, IssuanceAction::Certify, Role::Factory)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        node.decide_issuance(id, IssuanceAction::Reject, Role::Government)
            .unwrap();
        assert!(node.issuance(id).is_none());
        assert_eq!(node.balance(PRODUCER).unwrap(), 1000);

        let err = node
            .decide_issuance(id, IssuanceAction::Certify, Role::StateVerifier)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

#[test]
fn test_certify_for_frozen_producer_keeps_request() {
    for backend in BACKENDS {
        let mut t = TestNode::start(backend, SealPolicy::Immediate);
        let node = &mut t.node;
        let id = node.request_issuance(PRODUCER, 50).unwrap();
        node.set_frozen(Role::Government, PRODUCER, true).unwrap();

        let err = node
            .decide_issuance(id, IssuanceAction::Certify, Role::StateVerifier)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert!(node.issuance(id).is_some());

        node.set_frozen(Role::Government, PRODUCER, false).unwrap();
        node.decide_issuance(id, IssuanceAction::Certify, Role::StateVerifier)
            .unwrap();
        assert_eq!(node.balance(PRODUCER).unwrap(), 1050);
    }
}

#[test]
fn test_workflow_survives_restart() {
    for backend in BACKENDS {
        let mut t = TestNode::start(backend, SealPolicy::Immediate);
        let first = t.node.request_issuance(PRODUCER, 10).unwrap();
        t.node
            .decide_issuance(first, IssuanceAction::Reject, Role::StateVerifier)
            .unwrap();
        let second = t.node.request_issuance(PRODUCER, 20).unwrap();

        let mut t = t.reopen();
        assert!(t.node.issuance(first).is_none());
        assert_eq!(t.node.issuance(second).unwrap().amount, 20);

        // Ids keep counting after a restart.
        let third = t.node.request_issuance(PRODUCER, 30).unwrap();
        assert_eq!(third.to_string(), "ISSUE-3");
    }
}

#[test]
fn test_quota_limits_purchases_and_requests() {
    let mut t = TestNode::start(BackendKind::Simulated, SealPolicy::Immediate);
    let node = &mut t.node;
    node.set_quota(Role::Government, FACTORY, 100).unwrap();
    node.set_quota(Role::Government, PRODUCER, 400).unwrap();

    let err = node.purchase(FACTORY, PRODUCER, 150).unwrap_err();
    assert!(matches!(err, NodeError::QuotaExceeded { .. }));
    let err = node.request_issuance(PRODUCER, 401).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    node.purchase(FACTORY, PRODUCER, 100).unwrap();
    node.request_issuance(PRODUCER, 400).unwrap();
}

#[test]
fn test_manual_seal_policy_defers_balances() {
    let mut t = TestNode::start(BackendKind::Simulated, SealPolicy::Manual);
    let node = &mut t.node;

    node.purchase(FACTORY, PRODUCER, 600).unwrap();
    // Pending outgoing credit counts against the seller immediately.
    let err = node.purchase(FACTORY, PRODUCER, 500).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    assert_eq!(node.balance(FACTORY).unwrap(), 0);

    let block = node.seal().unwrap().unwrap();
    assert_eq!(block.transaction_count, 1);
    assert_eq!(node.balance(FACTORY).unwrap(), 600);
    assert_eq!(node.balance(PRODUCER).unwrap(), 400);

    let t = t.reopen();
    assert_eq!(t.node.balance(FACTORY).unwrap(), 600);
    assert_eq!(t.node.status().unwrap().pending_transactions, 0);
}
