// Copyright (c) 2024 Botho Foundation

//! CLI command implementations.
//!
//! These modules implement the user-facing CLI commands and legitimately
//! use stdout for output.

pub mod admin;
pub mod balance;
pub mod init;
pub mod issue;
pub mod migrate;
pub mod seal;
pub mod send;
pub mod status;
pub mod verify;

use anyhow::{anyhow, Context, Result};
use std::path::Path;

use crate::account::Role;
use crate::config::Config;
use crate::node::Node;

/// Load the config (with environment overrides) and open the node.
pub(crate) fn open_node(config_path: &Path) -> Result<(Config, Node)> {
    let config = Config::load_with_env(config_path)
        .context("No config found. Run 'ghcs init' first.")?;
    let node = Node::open(&config, config_path)
        .with_context(|| format!("Failed to open node state for {}", config_path.display()))?;
    Ok((config, node))
}

/// Role of the acting user given with `--as`.
pub(crate) fn acting_role(node: &Node, actor: Option<&str>) -> Result<Role> {
    let name = actor.ok_or_else(|| anyhow!("This command needs an acting user: pass --as <name>"))?;
    Ok(node.role_of(name)?)
}
