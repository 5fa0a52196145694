// Copyright (c) 2024 Botho Foundation

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::ledger::BackendKind;

/// Move balances from the simulated chain onto a new contract deployment and
/// switch the config to the contract backend
pub fn run(config_path: &Path) -> Result<()> {
    let (_config, mut node) = super::open_node(config_path)?;
    let report = node
        .migrate_to_contract()
        .context("Migration to the contract backend failed")?;

    // Saved without environment overrides so they stay out of the file.
    let mut config = Config::load(config_path)?;
    config.ledger.backend = BackendKind::Contract;
    config.save(config_path)?;

    println!("\nMigrated to contract {}", report.contract);
    println!("Users registered: {}", report.registered);
    if report.balances.is_empty() {
        println!("Balances issued: none");
    } else {
        println!("Balances issued:");
        for (name, amount) in &report.balances {
            println!("  {:<20} {:>12}", name, amount);
        }
        println!("  {:<20} {:>12}", "total", report.total_credits());
    }
    if !report.frozen.is_empty() {
        println!("Frozen again: {}", report.frozen.join(", "));
    }
    println!("Issuance requests carried over: {}", report.requests);
    println!("\nConfig now uses the contract backend: {}", config_path.display());
    Ok(())
}
