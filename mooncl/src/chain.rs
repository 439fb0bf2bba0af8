//! Chain identifiers and the per-chain contract address registry.
//!
//! - [`ChainId`] - Numeric EIP-155 chain identifier
//! - [`ContractAddresses`] - The NFT and launchpad deployments on one chain
//! - [`ChainRegistry`] - Immutable lookup table with a default fallback chain
//!
//! The registry is built once (usually from [`AppConfig`](crate::config::AppConfig))
//! and shared read-only behind an [`Arc`](std::sync::Arc).

use std::collections::HashMap;

use alloy_primitives::{Address, address};
use serde::{Deserialize, Serialize};

/// Numeric EIP-155 chain identifier.
pub type ChainId = u64;

/// Celo Mainnet chain ID.
pub const CELO_MAINNET: ChainId = 42220;

/// Celo Sepolia (testnet) chain ID.
pub const CELO_SEPOLIA: ChainId = 11_142_220;

/// Polkadot Paseo `PassetHub` (testnet) chain ID.
pub const PASEO_PASSET_HUB: ChainId = 420_420_422;

/// Chain used when the active chain is absent or unknown.
pub const DEFAULT_CHAIN: ChainId = CELO_SEPOLIA;

/// Text NFT contract on Celo Mainnet.
pub const NFT_CELO_MAINNET: Address = address!("A1FDE445Bc5Ec40aEfF725C9445aF233117aB133");

/// Launchpad contract on Celo Mainnet.
pub const LAUNCHPAD_CELO_MAINNET: Address = address!("4a3a600D326cBb5C6BD9571588AACcb960a33E6A");

/// Text NFT contract on Celo Sepolia.
pub const NFT_CELO_SEPOLIA: Address = address!("b65496c5FB50a9E79F4b8A21766bf7A018bF9f53");

/// Launchpad contract on Celo Sepolia.
pub const LAUNCHPAD_CELO_SEPOLIA: Address = address!("c59A9bF5dD006B23D855dbf88A8d63d9f2CAC288");

/// Text NFT contract on Paseo `PassetHub`.
pub const NFT_PASEO: Address = address!("b8e16E35DD436231CDa8fb357B4b49928E22c84b");

/// Launchpad contract on Paseo `PassetHub`.
pub const LAUNCHPAD_PASEO: Address = address!("998b7071F33d580B9389203277deA2baf68318aa");

/// Contract deployments on a single chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractAddresses {
    /// The text NFT contract (`mintFee`, `mint`).
    pub nft: Address,
    /// The launchpad contract (`buy`).
    pub launchpad: Address,
}

impl ContractAddresses {
    /// Creates a new pair of deployments.
    #[must_use]
    pub const fn new(nft: Address, launchpad: Address) -> Self {
        Self { nft, launchpad }
    }
}

/// Returns the hardcoded deployments of every known chain.
#[must_use]
pub fn known_deployments() -> Vec<(ChainId, ContractAddresses)> {
    vec![
        (
            CELO_MAINNET,
            ContractAddresses::new(NFT_CELO_MAINNET, LAUNCHPAD_CELO_MAINNET),
        ),
        (
            CELO_SEPOLIA,
            ContractAddresses::new(NFT_CELO_SEPOLIA, LAUNCHPAD_CELO_SEPOLIA),
        ),
        (
            PASEO_PASSET_HUB,
            ContractAddresses::new(NFT_PASEO, LAUNCHPAD_PASEO),
        ),
    ]
}

/// Immutable mapping from chain to contract deployments.
///
/// Lookups never fail: an absent or unregistered chain resolves to the
/// default chain's deployments. Use [`ChainRegistry::is_supported`] to decide
/// whether a chain may be written to.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    entries: HashMap<ChainId, ContractAddresses>,
    default_chain: ChainId,
    fallback: ContractAddresses,
}

impl ChainRegistry {
    /// Builds a registry from explicit entries.
    ///
    /// `fallback` is returned for chains without an entry. When `default_chain`
    /// is itself a key, its entry takes precedence over `fallback`.
    #[must_use]
    pub fn new<I>(entries: I, default_chain: ChainId, fallback: ContractAddresses) -> Self
    where
        I: IntoIterator<Item = (ChainId, ContractAddresses)>,
    {
        let entries: HashMap<_, _> = entries.into_iter().collect();
        let fallback = entries.get(&default_chain).copied().unwrap_or(fallback);
        Self {
            entries,
            default_chain,
            fallback,
        }
    }

    /// Builds the registry of known chains with their hardcoded deployments.
    #[must_use]
    pub fn known() -> Self {
        Self::new(
            known_deployments(),
            DEFAULT_CHAIN,
            ContractAddresses::new(NFT_CELO_SEPOLIA, LAUNCHPAD_CELO_SEPOLIA),
        )
    }

    /// Returns the default chain.
    #[must_use]
    pub const fn default_chain(&self) -> ChainId {
        self.default_chain
    }

    /// Returns `true` iff the chain has an explicit entry.
    #[must_use]
    pub fn is_supported(&self, chain_id: ChainId) -> bool {
        self.entries.contains_key(&chain_id)
    }

    /// Resolves the deployments for a chain, falling back to the default chain.
    #[must_use]
    pub fn resolve_addresses(&self, chain_id: Option<ChainId>) -> &ContractAddresses {
        chain_id
            .and_then(|id| self.entries.get(&id))
            .unwrap_or(&self.fallback)
    }

    /// Resolves the NFT contract address for a chain.
    #[must_use]
    pub fn nft_address(&self, chain_id: Option<ChainId>) -> Address {
        self.resolve_addresses(chain_id).nft
    }

    /// Resolves the launchpad contract address for a chain.
    #[must_use]
    pub fn launchpad_address(&self, chain_id: Option<ChainId>) -> Address {
        self.resolve_addresses(chain_id).launchpad
    }

    /// Iterates over the registered chains in ascending order.
    pub fn chains(&self) -> impl Iterator<Item = ChainId> + '_ {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::known()
    }
}
