// Copyright (c) 2024 Botho Foundation

//! Participant accounts and roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::address::Address;
use crate::transaction::NETWORK_SENDER;

/// Role of a participant. Role decides which workflow and admin actions an
/// account may take; it has no effect on ledger accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Producer,
    Factory,
    #[serde(rename = "State Verifier", alias = "State Poll")]
    StateVerifier,
    Government,
    Citizen,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Producer => "Producer",
            Role::Factory => "Factory",
            Role::StateVerifier => "State Verifier",
            Role::Government => "Government",
            Role::Citizen => "Citizen",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "producer" => Ok(Role::Producer),
            "factory" => Ok(Role::Factory),
            "stateverifier" | "statepoll" | "verifier" => Ok(Role::StateVerifier),
            "government" | "govt" => Ok(Role::Government),
            "citizen" => Ok(Role::Citizen),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Stored user record, keyed by account name in the state document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub role: Role,

    #[serde(default)]
    pub frozen: bool,

    /// Contract-ledger address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,

    /// Declared production capacity (producers only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u64>,
}

impl UserRecord {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            frozen: false,
            address: None,
            capacity: None,
        }
    }
}

/// Check an account name is usable: non-empty after trimming and not the
/// network sentinel.
pub fn validate_account_name(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("account name is empty");
    }
    if name == NETWORK_SENDER {
        return Err("account name is reserved");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_accepts_legacy_names() {
        assert_eq!("State Poll".parse::<Role>().unwrap(), Role::StateVerifier);
        assert_eq!("state-verifier".parse::<Role>().unwrap(), Role::StateVerifier);
        assert_eq!("Government".parse::<Role>().unwrap(), Role::Government);
        assert!("Miner".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_uses_display_names() {
        let json = serde_json::to_string(&Role::StateVerifier).unwrap();
        assert_eq!(json, "\"State Verifier\"");
        let legacy: Role = serde_json::from_str("\"State Poll\"").unwrap();
        assert_eq!(legacy, Role::StateVerifier);
    }

    #[test]
    fn test_user_record_defaults() {
        let record: UserRecord = serde_json::from_str(r#"{"role":"Factory"}"#).unwrap();
        assert_eq!(record, UserRecord::new(Role::Factory));
    }

    #[test]
    fn test_reserved_names() {
        assert!(validate_account_name("system").is_err());
        assert!(validate_account_name("   ").is_err());
        assert!(validate_account_name("CitizenOne").is_ok());
    }
}
