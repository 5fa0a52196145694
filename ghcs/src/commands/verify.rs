// Copyright (c) 2024 Botho Foundation

use anyhow::{Context, Result};
use std::path::Path;

/// Re-check ledger integrity
pub fn run(config_path: &Path) -> Result<()> {
    let (_config, node) = super::open_node(config_path)?;
    node.verify().context("Ledger verification failed")?;
    println!("Ledger OK ({} backend)", node.backend()?);
    Ok(())
}
