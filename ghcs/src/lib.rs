// Copyright (c) 2024 Botho Foundation

//! Green hydrogen credit ledger.
//!
//! Credits are issued to producers through a verification workflow and
//! traded between accounts on one of two ledgers: a simulated proof-of-work
//! chain or an account-based contract.

#![deny(clippy::print_stdout)]

pub mod account;
pub mod address;
pub mod block;
pub mod config;
pub mod hashing;
pub mod issuance;
pub mod ledger;
pub mod mempool;
pub mod node;
pub mod store;
pub mod telemetry;
pub mod transaction;

// Re-export commands module for CLI binary
#[allow(clippy::print_stdout)]
pub mod commands;
