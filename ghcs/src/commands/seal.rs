// Copyright (c) 2024 Botho Foundation

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::Ordering;
use tracing::info;

/// Seal pending transactions into a block. Ctrl-C cancels the proof search.
pub fn run(config_path: &Path) -> Result<()> {
    let (_config, mut node) = super::open_node(config_path)?;

    let shutdown = node.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("Cancelling proof search...");
        shutdown.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl-C handler")?;

    match node.seal()? {
        Some(block) => {
            println!("Sealed block #{}", block.index);
            println!("  Hash: {}", block.hash);
            println!("  Transactions: {}", block.transaction_count);
        }
        None => println!(
            "Nothing to seal: the {} backend applies calls immediately.",
            node.backend()?
        ),
    }
    Ok(())
}
