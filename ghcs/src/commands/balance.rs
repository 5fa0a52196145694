// Copyright (c) 2024 Botho Foundation

use anyhow::Result;
use std::path::Path;

/// Show an account's balance
pub fn run(config_path: &Path, account: &str) -> Result<()> {
    let (_config, node) = super::open_node(config_path)?;
    let record = node.user(account)?;
    let balance = node.balance(account)?;

    println!();
    println!("=== {} ===", account);
    println!("Role: {}", record.role);
    if let Some(address) = record.address {
        println!("Address: {}", address);
    }
    if let Some(capacity) = record.capacity {
        println!("Capacity: {}", capacity);
    }
    if let Some(quota) = node.quotas().get(account) {
        println!("Quota: {}", quota);
    }
    println!("Balance: {} credits", balance);
    if node.is_frozen(account)? {
        println!("Status: FROZEN");
    }
    println!();

    Ok(())
}

/// Show an account's transactions, newest first
pub fn history(config_path: &Path, account: &str, limit: usize) -> Result<()> {
    let (_config, node) = super::open_node(config_path)?;
    node.user(account)?;
    let entries = node.history(account, limit)?;

    if entries.is_empty() {
        println!("No transactions for {}", account);
        return Ok(());
    }

    println!(
        "{:>6}  {:<20}  {:<20}  {:>10}  {:<25}  details",
        "pos", "from", "to", "amount", "time"
    );
    for entry in entries {
        println!(
            "{:>6}  {:<20}  {:<20}  {:>10}  {:<25}  {}",
            entry.position,
            entry.sender,
            entry.recipient,
            entry.amount,
            entry.timestamp.to_rfc3339(),
            entry.details
        );
    }

    Ok(())
}
