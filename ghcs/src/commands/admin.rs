// Copyright (c) 2024 Botho Foundation

//! Government administration: freezing accounts, setting quotas and
//! registering users.

use anyhow::Result;
use std::path::Path;

use crate::account::Role;
use crate::address::Address;

pub fn freeze(config_path: &Path, actor: Option<&str>, account: &str, frozen: bool) -> Result<()> {
    let (_config, mut node) = super::open_node(config_path)?;
    let role = super::acting_role(&node, actor)?;
    node.set_frozen(role, account, frozen)?;

    if frozen {
        println!("{} is frozen", account);
    } else {
        println!("{} is active", account);
    }
    Ok(())
}

pub fn quota(config_path: &Path, actor: Option<&str>, account: &str, amount: u64) -> Result<()> {
    let (_config, mut node) = super::open_node(config_path)?;
    let role = super::acting_role(&node, actor)?;
    node.set_quota(role, account, amount)?;

    println!("Quota for {} set to {}", account, amount);
    Ok(())
}

pub fn register(
    config_path: &Path,
    name: &str,
    role: Role,
    address: Option<Address>,
    capacity: Option<u64>,
) -> Result<()> {
    let (_config, mut node) = super::open_node(config_path)?;
    node.register_user(name, role, address, capacity)?;

    let record = node.user(name)?;
    println!("Registered {} as {}", name, record.role);
    if let Some(address) = record.address {
        println!("Address: {}", address);
    }
    Ok(())
}
