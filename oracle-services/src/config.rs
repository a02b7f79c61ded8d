//! Oracle pool configuration
//!
//! Values come from three layers, later ones winning:
//! built-in defaults, the deployment file written when the contracts are
//! migrated, and `ORACLE_*` environment variables.

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::str::FromStr;

use alloy::primitives::{Address, U256};
use serde::Deserialize;

use oracle_chain::DEFAULT_GAS_LIMIT;

/// Default number of oracle accounts
pub const DEFAULT_POOL_SIZE: usize = 20;

/// 1 ether in wei, the fee used when the contract can't be asked
pub const DEFAULT_FEE_WEI: u128 = 1_000_000_000_000_000_000;

const DEFAULT_RPC_URL: &str = "ws://127.0.0.1:7545";
const DEFAULT_NETWORK: &str = "localhost";
const DEFAULT_HEALTH_LOG_INTERVAL_SECS: u64 = 60;

/// Configuration shared read-only by every oracle in the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleConfig {
    /// WebSocket JSON-RPC endpoint (subscriptions need a pubsub transport)
    pub rpc_url: String,
    /// FlightSuretyApp contract address
    pub contract_address: Address,
    /// How many accounts from the end of the ledger's list become oracles
    pub pool_size: usize,
    /// Fee paid when the contract's fee can't be read
    pub default_fee: U256,
    /// Block the request subscription starts from
    pub from_block: u64,
    pub gas_limit: u64,
    /// Port for the JSON health endpoint; disabled when unset
    pub health_port: Option<u16>,
    pub health_log_interval_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            contract_address: Address::ZERO,
            pool_size: DEFAULT_POOL_SIZE,
            default_fee: U256::from(DEFAULT_FEE_WEI),
            from_block: 0,
            gas_limit: DEFAULT_GAS_LIMIT,
            health_port: None,
            health_log_interval_secs: DEFAULT_HEALTH_LOG_INTERVAL_SECS,
        }
    }
}

/// The part of a deployment file network entry oracles need; other keys are ignored
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentEntry {
    pub url: String,
    pub app_address: Address,
}

impl OracleConfig {
    /// Load configuration from the process environment
    ///
    /// Reads:
    /// - ORACLE_CONFIG_FILE / ORACLE_NETWORK: deployment file and network entry
    /// - ORACLE_RPC_URL, ORACLE_APP_ADDRESS, ORACLE_POOL_SIZE, ORACLE_DEFAULT_FEE_WEI,
    ///   ORACLE_FROM_BLOCK, ORACLE_GAS_LIMIT, ORACLE_HEALTH_PORT, ORACLE_HEALTH_LOG_SECS
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let mut address_set = false;

        if let Some(path) = lookup("ORACLE_CONFIG_FILE") {
            let network = lookup("ORACLE_NETWORK").unwrap_or_else(|| DEFAULT_NETWORK.to_string());
            let entry = read_deployment_entry(Path::new(&path), &network)?;
            config.rpc_url = to_ws_url(&entry.url);
            config.contract_address = entry.app_address;
            address_set = true;
        }

        if let Some(url) = lookup("ORACLE_RPC_URL") {
            config.rpc_url = to_ws_url(&url);
        }
        if let Some(address) = lookup("ORACLE_APP_ADDRESS") {
            config.contract_address = parse_field("ORACLE_APP_ADDRESS", &address)?;
            address_set = true;
        }
        if let Some(size) = lookup("ORACLE_POOL_SIZE") {
            config.pool_size = parse_field("ORACLE_POOL_SIZE", &size)?;
        }
        if let Some(fee) = lookup("ORACLE_DEFAULT_FEE_WEI") {
            config.default_fee = parse_field("ORACLE_DEFAULT_FEE_WEI", &fee)?;
        }
        if let Some(block) = lookup("ORACLE_FROM_BLOCK") {
            config.from_block = parse_field("ORACLE_FROM_BLOCK", &block)?;
        }
        if let Some(gas) = lookup("ORACLE_GAS_LIMIT") {
            config.gas_limit = parse_field("ORACLE_GAS_LIMIT", &gas)?;
        }
        if let Some(port) = lookup("ORACLE_HEALTH_PORT") {
            config.health_port = Some(parse_field("ORACLE_HEALTH_PORT", &port)?);
        }
        if let Some(secs) = lookup("ORACLE_HEALTH_LOG_SECS") {
            config.health_log_interval_secs = parse_field("ORACLE_HEALTH_LOG_SECS", &secs)?;
        }

        if !address_set {
            return Err(ConfigError::MissingContractAddress);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ORACLE_POOL_SIZE".to_string(),
                value: "0".to_string(),
                error: "pool size must be at least 1".to_string(),
            });
        }
        if self.health_log_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ORACLE_HEALTH_LOG_SECS".to_string(),
                value: "0".to_string(),
                error: "interval must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }
}

/// Read one network's entry from a deployment file
pub fn read_deployment_entry(path: &Path, network: &str) -> Result<DeploymentEntry, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::DeploymentFile {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;

    let mut networks: HashMap<String, DeploymentEntry> =
        serde_json::from_str(&content).map_err(|e| ConfigError::DeploymentFile {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

    networks
        .remove(network)
        .ok_or_else(|| ConfigError::UnknownNetwork {
            network: network.to_string(),
            path: path.display().to_string(),
        })
}

/// Rewrite an HTTP endpoint to its WebSocket equivalent
pub fn to_ws_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        url.to_string()
    }
}

fn parse_field<T>(field: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        error: e.to_string(),
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No contract address: set ORACLE_APP_ADDRESS or ORACLE_CONFIG_FILE")]
    MissingContractAddress,

    #[error("Invalid value for {field} ({value}): {error}")]
    InvalidValue {
        field: String,
        value: String,
        error: String,
    },

    #[error("Failed to read deployment file {path}: {error}")]
    DeploymentFile { path: String, error: String },

    #[error("Network {network} not found in {path}")]
    UnknownNetwork { network: String, path: String },
}
