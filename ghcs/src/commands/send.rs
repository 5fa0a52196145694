// Copyright (c) 2024 Botho Foundation

use anyhow::{Context, Result};
use std::path::Path;

/// Append a raw transaction to the ledger
pub fn submit(
    config_path: &Path,
    sender: &str,
    recipient: &str,
    amount: u64,
    details: &str,
) -> Result<()> {
    let (_config, mut node) = super::open_node(config_path)?;
    let position = node
        .submit(sender, recipient, amount, details)
        .context("Transaction rejected")?;

    println!("Transaction accepted: {} -> {} ({} credits)", sender, recipient, amount);
    println!("Position: {}", position);
    Ok(())
}

/// Buy credits from `seller` as the acting factory
pub fn purchase(config_path: &Path, buyer: Option<&str>, seller: &str, amount: u64) -> Result<()> {
    let (_config, mut node) = super::open_node(config_path)?;
    let buyer = buyer.context("Purchasing needs an acting factory: pass --as <name>")?;
    node.purchase(buyer, seller, amount)
        .context("Purchase failed")?;

    println!("{} bought {} credits from {}", buyer, amount, seller);
    println!("  {}: {}", buyer, node.balance(buyer)?);
    println!("  {}: {}", seller, node.balance(seller)?);
    if node.status()?.pending_transactions > 0 {
        println!("Pending until the next 'ghcs seal'.");
    }
    Ok(())
}
