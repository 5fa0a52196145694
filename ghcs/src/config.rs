use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::account::Role;
use crate::address::Address;
use crate::ledger::backend::BackendOptions;
use crate::ledger::{BackendKind, SealPolicy};

/// Environment variables that override the config file
pub const ENV_BACKEND: &str = "GHCS_BACKEND";
pub const ENV_DATA_FILE: &str = "GHCS_DATA_FILE";
pub const ENV_LOG_LEVEL: &str = "GHCS_LOG_LEVEL";
pub const ENV_SEAL_POLICY: &str = "GHCS_SEAL_POLICY";

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Accounts created with a fresh state document
    #[serde(default = "default_accounts")]
    pub accounts: Vec<AccountSeed>,

    /// Credits issued to seed accounts when the chain is created
    #[serde(default = "default_genesis")]
    pub genesis: Vec<GenesisAllocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// `simulated` or `contract`
    #[serde(default)]
    pub backend: BackendKind,

    /// `immediate` seals after every mint or transfer, `manual` waits for `seal`
    #[serde(default)]
    pub seal_policy: SealPolicy,

    /// Use the simulated ledger when the contract deployment cannot be read
    #[serde(default = "default_true")]
    pub fallback_to_simulated: bool,

    /// Contract deployment document (relative to the config directory)
    #[serde(default = "default_contract_file")]
    pub contract_file: String,

    /// Read attempts for the contract deployment document
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            seal_policy: SealPolicy::default(),
            fallback_to_simulated: true,
            contract_file: default_contract_file(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// State document (relative to the config directory)
    #[serde(default = "default_data_file")]
    pub data_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSeed {
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u64>,
    /// Contract address; derived from the name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub account: String,
    pub amount: u64,
}

fn default_true() -> bool {
    true
}

fn default_contract_file() -> String {
    "contract.json".to_string()
}

fn default_retry_attempts() -> usize {
    5
}

fn default_data_file() -> String {
    "ghcs_data.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn seed(name: &str, role: Role, capacity: Option<u64>) -> AccountSeed {
    AccountSeed {
        name: name.to_string(),
        role,
        capacity,
        address: None,
    }
}

fn default_accounts() -> Vec<AccountSeed> {
    vec![
        seed("GovtAdmin", Role::Government, None),
        seed("StatePollGujarat", Role::StateVerifier, None),
        seed("SomnathProducers", Role::Producer, Some(5000)),
        seed("Ammonia Factory", Role::Factory, None),
        seed("CitizenOne", Role::Citizen, None),
    ]
}

fn default_genesis() -> Vec<GenesisAllocation> {
    vec![GenesisAllocation {
        account: "SomnathProducers".to_string(),
        amount: 1000,
    }]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            accounts: default_accounts(),
            genesis: default_genesis(),
        }
    }
}

impl Config {
    /// Load config from a file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config and apply `GHCS_*` environment overrides
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(backend) = env_var(ENV_BACKEND) {
            self.ledger.backend = backend
                .parse()
                .map_err(|e: String| anyhow!("{}: {}", ENV_BACKEND, e))?;
        }
        if let Some(policy) = env_var(ENV_SEAL_POLICY) {
            self.ledger.seal_policy = policy
                .parse()
                .map_err(|e: String| anyhow!("{}: {}", ENV_SEAL_POLICY, e))?;
        }
        if let Some(data_file) = env_var(ENV_DATA_FILE) {
            self.storage.data_file = data_file;
        }
        if let Some(level) = env_var(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Reject seed data that could never produce a consistent ledger
    pub fn validate(&self) -> Result<()> {
        let mut names = std::collections::HashSet::new();
        for account in &self.accounts {
            crate::account::validate_account_name(&account.name)
                .map_err(|reason| anyhow!("Seed account '{}': {}", account.name, reason))?;
            if !names.insert(account.name.as_str()) {
                return Err(anyhow!("Seed account '{}' is listed twice", account.name));
            }
        }
        for allocation in &self.genesis {
            if allocation.amount == 0 {
                return Err(anyhow!(
                    "Genesis allocation for '{}' must be greater than zero",
                    allocation.account
                ));
            }
            if !names.contains(allocation.account.as_str()) {
                return Err(anyhow!(
                    "Genesis allocation names unknown account '{}'",
                    allocation.account
                ));
            }
        }
        Ok(())
    }

    pub fn data_file_path(&self, config_path: &Path) -> PathBuf {
        resolve_path(config_path, &self.storage.data_file)
    }

    pub fn contract_file_path(&self, config_path: &Path) -> PathBuf {
        resolve_path(config_path, &self.ledger.contract_file)
    }

    pub fn backend_options(&self, config_path: &Path) -> BackendOptions {
        BackendOptions {
            kind: self.ledger.backend,
            contract_file: self.contract_file_path(config_path),
            fallback_to_simulated: self.ledger.fallback_to_simulated,
            retry_attempts: self.ledger.retry_attempts,
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve `file` against the directory holding the config file
pub fn resolve_path(config_path: &Path, file: &str) -> PathBuf {
    let file = Path::new(file);
    if file.is_absolute() {
        return file.to_path_buf();
    }
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(file)
}

/// Get the default config directory path
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ghcs")
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}
