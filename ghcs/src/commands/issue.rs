// Copyright (c) 2024 Botho Foundation

use anyhow::{Context, Result};
use std::path::Path;

use crate::issuance::{IssuanceAction, IssuanceId, IssuanceStatus};

/// Request an issuance as the acting producer
pub fn request(config_path: &Path, producer: Option<&str>, amount: u64) -> Result<()> {
    let (_config, mut node) = super::open_node(config_path)?;
    let producer =
        producer.context("Requesting an issuance needs an acting producer: pass --as <name>")?;
    let id = node.request_issuance(producer, amount)?;

    println!("Issuance request {} submitted for {} credits", id, amount);
    println!("Status: Pending Verification");
    Ok(())
}

/// Certify, scrutinize or reject a request
pub fn decide(
    config_path: &Path,
    actor: Option<&str>,
    id: &str,
    action: IssuanceAction,
) -> Result<()> {
    let (_config, mut node) = super::open_node(config_path)?;
    let role = super::acting_role(&node, actor)?;
    let id: IssuanceId = id.parse()?;
    let decision = node.decide_issuance(id, action, role)?;

    println!(
        "{}: {} ({} credits for {})",
        decision.id, decision.status, decision.amount, decision.producer
    );
    if decision.status.is_terminal() {
        println!("{} balance: {}", decision.producer, node.balance(&decision.producer)?);
    }
    Ok(())
}

/// List requests awaiting a decision, optionally only those under scrutiny
pub fn list(config_path: &Path, escalated: bool) -> Result<()> {
    let (_config, node) = super::open_node(config_path)?;
    let requests: Vec<_> = if escalated {
        node.requests_with_status(IssuanceStatus::UnderScrutiny).collect()
    } else {
        node.active_requests().collect()
    };

    if requests.is_empty() {
        println!("No issuance requests in progress.");
        return Ok(());
    }

    println!("{:<10}  {:<20}  {:>10}  {:<22}  created", "id", "producer", "amount", "status");
    for request in requests {
        println!(
            "{:<10}  {:<20}  {:>10}  {:<22}  {}",
            request.id.to_string(),
            request.producer,
            request.amount,
            request.status.to_string(),
            request.created_at.to_rfc3339()
        );
    }
    Ok(())
}
