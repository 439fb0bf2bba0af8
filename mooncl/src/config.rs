//! Environment-driven configuration.
//!
//! # Environment Variables
//!
//! - `MOONCL_API_BASE` - Base URL of the listing API (no default; lookups fail fast without it)
//! - `MOONCL_API_NETWORK` - Network segment of chain-specific API routes, e.g. `celo-sepolia`
//! - `MOONCL_WALLETCONNECT_PROJECT_ID` - Project id handed to wallet connectors
//! - `MOONCL_RPC_URL` - JSON-RPC endpoint (default: the chain's public endpoint)
//! - `MOONCL_CHAIN_ID` - Chain to use (default: Celo Sepolia)
//! - `MOONCL_CONFIRMATION_TIMEOUT_SECS` - Give up waiting for receipts after this many seconds
//! - `MOONCL_RECEIPT_POLL_MS` - Interval between receipt lookups (default: the ledger's own)
//! - `MOONCL_CELO_MAIN_NFT_ADDR`, `MOONCL_CELO_MAIN_MARKET_ADDR` - Celo Mainnet deployments
//! - `MOONCL_CELO_NFT_ADDR`, `MOONCL_CELO_MARKET_ADDR` - Celo Sepolia deployments
//!
//! Unset or empty variables keep the built-in value; malformed ones are an error.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use url::Url;

use crate::chain::{CELO_MAINNET, CELO_SEPOLIA, ChainId, ChainRegistry, ContractAddresses, DEFAULT_CHAIN, known_deployments};
use crate::gateway::GatewayConfig;

/// Error returned when an environment variable holds a malformed value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Not a 20-byte hex address.
    #[error("{var} is not a valid address: {value:?}")]
    InvalidAddress {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
    /// Not a non-negative integer.
    #[error("{var} is not a valid number: {value:?}")]
    InvalidNumber {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
    /// Not an absolute URL.
    #[error("{var} is not a valid URL: {value:?} ({reason})")]
    InvalidUrl {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
        /// Parser message.
        reason: String,
    },
}

/// Which field of a deployment an address variable overrides.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Nft,
    Launchpad,
}

const ADDRESS_OVERRIDES: [(&str, ChainId, Slot); 4] = [
    ("MOONCL_CELO_MAIN_NFT_ADDR", CELO_MAINNET, Slot::Nft),
    ("MOONCL_CELO_MAIN_MARKET_ADDR", CELO_MAINNET, Slot::Launchpad),
    ("MOONCL_CELO_NFT_ADDR", CELO_SEPOLIA, Slot::Nft),
    ("MOONCL_CELO_MARKET_ADDR", CELO_SEPOLIA, Slot::Launchpad),
];

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Base URL of the listing API.
    pub api_base: Option<Url>,
    /// Network segment of chain-specific API routes.
    pub api_network: Option<String>,
    /// Wallet connector project id.
    pub walletconnect_project_id: Option<String>,
    /// JSON-RPC endpoint override.
    pub rpc_url: Option<Url>,
    /// Chain to use.
    pub chain_id: ChainId,
    /// Receipt wait limit.
    pub confirmation_timeout: Option<Duration>,
    /// Interval between receipt lookups.
    pub receipt_poll_interval: Option<Duration>,
    /// Contract deployments per chain.
    pub deployments: BTreeMap<ChainId, ContractAddresses>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            api_network: None,
            walletconnect_project_id: None,
            rpc_url: None,
            chain_id: DEFAULT_CHAIN,
            confirmation_timeout: None,
            receipt_poll_interval: None,
            deployments: known_deployments().into_iter().collect(),
        }
    }
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first malformed variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first malformed variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self {
            api_base: var("MOONCL_API_BASE")
                .map(|value| parse_url("MOONCL_API_BASE", &value))
                .transpose()?,
            api_network: var("MOONCL_API_NETWORK"),
            walletconnect_project_id: var("MOONCL_WALLETCONNECT_PROJECT_ID"),
            rpc_url: var("MOONCL_RPC_URL")
                .map(|value| parse_url("MOONCL_RPC_URL", &value))
                .transpose()?,
            ..Self::default()
        };
        if let Some(value) = var("MOONCL_CHAIN_ID") {
            config.chain_id = parse_number("MOONCL_CHAIN_ID", &value)?;
        }
        if let Some(value) = var("MOONCL_CONFIRMATION_TIMEOUT_SECS") {
            let secs = parse_number("MOONCL_CONFIRMATION_TIMEOUT_SECS", &value)?;
            config.confirmation_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(value) = var("MOONCL_RECEIPT_POLL_MS") {
            let millis = parse_number("MOONCL_RECEIPT_POLL_MS", &value)?;
            config.receipt_poll_interval = (millis > 0).then(|| Duration::from_millis(millis));
        }

        for (name, chain_id, slot) in ADDRESS_OVERRIDES {
            let Some(value) = var(name) else { continue };
            let address = Address::from_str(&value).map_err(|_| ConfigError::InvalidAddress {
                var: name,
                value: value.clone(),
            })?;
            let Some(entry) = config.deployments.get_mut(&chain_id) else {
                continue;
            };
            match slot {
                Slot::Nft => entry.nft = address,
                Slot::Launchpad => entry.launchpad = address,
            }
        }

        Ok(config)
    }

    /// Builds the chain registry from the configured deployments.
    #[must_use]
    pub fn registry(&self) -> ChainRegistry {
        let fallback = self
            .deployments
            .get(&DEFAULT_CHAIN)
            .copied()
            .unwrap_or_else(|| *ChainRegistry::known().resolve_addresses(None));
        ChainRegistry::new(
            self.deployments.iter().map(|(id, addrs)| (*id, *addrs)),
            DEFAULT_CHAIN,
            fallback,
        )
    }

    /// Gateway policy derived from the configuration.
    #[must_use]
    pub const fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            confirmation_timeout: self.confirmation_timeout,
        }
    }
}

fn parse_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        var,
        value: value.to_owned(),
        reason: e.to_string(),
    })
}

fn parse_number(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: value.to_owned(),
    })
}
