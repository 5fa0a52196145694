// Copyright (c) 2024 Botho Foundation

//! Backend selection and the contract deployment document.
//!
//! The simulated ledger always exists (it lives in the state document). The
//! contract ledger is read from its own deployment file; transient I/O
//! failures are retried with Fibonacci backoff, and an unavailable contract
//! either falls back to the simulated ledger or is reported.

use retry::delay::{jitter, Fibonacci};
use retry::OperationResult;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{BackendKind, ContractLedger, CreditLedger, LedgerError, SimulatedLedger};
use crate::address::Address;
use crate::config::{AccountSeed, GenesisAllocation};
use crate::store::write_json_atomic;

/// How to pick and open a ledger backend
#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub kind: BackendKind,
    pub contract_file: PathBuf,
    pub fallback_to_simulated: bool,
    /// Attempts for transient read failures (at least one is always made)
    pub retry_attempts: usize,
}

fn retry_delays(attempts: usize) -> impl Iterator<Item = Duration> {
    // The first attempt is not a retry.
    Fibonacci::from_millis(50)
        .take(attempts.saturating_sub(1))
        .map(jitter)
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Read and check a contract deployment document.
pub fn load_contract(path: &Path, attempts: usize) -> Result<ContractLedger, LedgerError> {
    let mut tries = 0usize;
    let bytes = retry::retry(retry_delays(attempts), || {
        tries += 1;
        match std::fs::read(path) {
            Ok(bytes) => OperationResult::Ok(bytes),
            Err(e) if is_transient(&e) => {
                debug!(
                    path = %path.display(),
                    attempt = tries,
                    error = %e,
                    "Retrying contract read"
                );
                OperationResult::Retry(e)
            }
            Err(e) => OperationResult::Err(e),
        }
    })
    .map_err(|e| {
        LedgerError::BackendUnavailable(format!(
            "cannot read contract deployment {}: {} (after {} tries)",
            path.display(),
            e.error,
            e.tries
        ))
    })?;

    let contract: ContractLedger = serde_json::from_slice(&bytes).map_err(|e| {
        LedgerError::BackendUnavailable(format!(
            "contract deployment {} is unreadable: {}",
            path.display(),
            e
        ))
    })?;
    contract.check_consistency()?;

    info!(
        path = %path.display(),
        contract = %contract.address(),
        calls = contract.contract_info().last_call,
        "Loaded contract deployment"
    );
    Ok(contract)
}

pub fn save_contract(path: &Path, contract: &ContractLedger) -> Result<(), LedgerError> {
    write_json_atomic(path, contract).map_err(|e| {
        LedgerError::BackendUnavailable(format!(
            "cannot write contract deployment {}: {}",
            path.display(),
            e
        ))
    })?;
    debug!(path = %path.display(), "Saved contract deployment");
    Ok(())
}

/// Identity the node uses as the contract owner
pub const CONTRACT_OPERATOR: &str = "ghcs-operator";

/// Deploy a contract, register the seed accounts and issue the genesis
/// allocations.
pub fn deploy_contract(
    accounts: &[AccountSeed],
    allocations: &[GenesisAllocation],
) -> Result<ContractLedger, LedgerError> {
    let mut contract = ContractLedger::deploy(Address::derive_from_name(CONTRACT_OPERATOR));
    for seed in accounts {
        contract.register(&seed.name, seed.address)?;
    }
    for allocation in allocations {
        contract.mint(&allocation.account, allocation.amount, "Genesis allocation")?;
    }
    Ok(contract)
}

/// Select the configured backend.
///
/// `simulated` builds the chain ledger from the state document. It is only
/// called for the simulated backend, or as the fallback when the contract
/// cannot be reached.
pub fn open_backend<F>(
    options: &BackendOptions,
    simulated: F,
) -> Result<Box<dyn CreditLedger>, LedgerError>
where
    F: FnOnce() -> Result<SimulatedLedger, LedgerError>,
{
    match options.kind {
        BackendKind::Simulated => Ok(Box::new(simulated()?)),
        BackendKind::Contract => {
            match load_contract(&options.contract_file, options.retry_attempts.max(1)) {
                Ok(contract) => Ok(Box::new(contract)),
                Err(e) if e.is_retryable() && options.fallback_to_simulated => {
                    warn!(
                        error = %e,
                        "Contract backend unavailable, falling back to simulated ledger"
                    );
                    Ok(Box::new(simulated()?))
                }
                Err(e) => Err(e),
            }
        }
    }
}
