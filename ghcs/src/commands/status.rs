// Copyright (c) 2024 Botho Foundation

use anyhow::Result;
use std::path::Path;

use crate::ledger::LedgerSummary;

/// Show ledger, user and workflow status
pub fn run(config_path: &Path) -> Result<()> {
    let (_config, node) = super::open_node(config_path)?;
    let status = node.status()?;

    println!();
    println!("=== GHCS Status ===");
    println!();
    println!("Ledger:");
    println!("  Backend: {}", status.backend);
    match &status.ledger {
        LedgerSummary::Chain(info) => {
            println!("  Seal policy: {:?}", status.seal_policy);
            println!("  Blocks: {}", info.length);
            println!("  Tip: #{} {}", info.tip_index, info.tip_hash.short());
            println!("  Tip time: {}", info.tip_timestamp.to_rfc3339());
            println!("  Sealed transactions: {}", info.total_transactions);
            println!("  Pending transactions: {}", info.pending_transactions);
        }
        LedgerSummary::Contract(info) => {
            println!("  Contract: {}", info.address);
            println!("  Owner: {}", info.owner);
            println!("  Total supply: {}", info.total_supply);
            println!("  Accounts: {}", info.accounts);
            println!("  Calls: {}", info.last_call);
        }
    }
    println!();
    println!("Users: {}", status.users);
    if status.frozen_users.is_empty() {
        println!("  Frozen: none");
    } else {
        println!("  Frozen: {}", status.frozen_users.join(", "));
    }
    println!();
    println!("Issuance requests in progress: {}", status.active_requests);
    println!("State file: {}", status.data_file.display());
    println!();

    Ok(())
}
