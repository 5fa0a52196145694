// Copyright (c) 2024 Botho Foundation

use anyhow::{bail, Result};
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::ledger::BackendKind;
use crate::node::Node;

/// Write a default config and create the genesis state
pub fn run(config_path: &Path, backend: Option<BackendKind>) -> Result<()> {
    if Config::exists(config_path) {
        bail!(
            "Config already exists at {}\n\
             Use a different --config path or delete the existing config.",
            config_path.display()
        );
    }

    let mut config = Config::default();
    if let Some(backend) = backend {
        config.ledger.backend = backend;
    }
    config.save(config_path)?;

    let node = Node::open(&config, config_path)?;
    let status = node.status()?;
    info!("Initialized at {}", config_path.display());

    println!("\nGreen hydrogen credit ledger created.");
    println!("Config saved to: {}", config_path.display());
    println!("State saved to:  {}", status.data_file.display());
    println!("Backend: {}", status.backend);
    println!("\nSeed accounts:");
    for (name, record) in node.users() {
        println!("  {:<20} {}", name, record.role);
    }
    println!("\nNext steps:");
    println!("  1. Run 'ghcs status' to inspect the ledger");
    println!("  2. Run 'ghcs --as <producer> issue request <amount>' to request credits");

    Ok(())
}
