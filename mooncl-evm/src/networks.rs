//! Known networks the Mooncl contracts are deployed on.

use mooncl::chain::{CELO_MAINNET, CELO_SEPOLIA, ChainId, PASEO_PASSET_HUB};
use url::Url;

/// Public metadata of a supported network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    /// EIP-155 chain id.
    pub chain_id: ChainId,
    /// Human-readable name.
    pub name: &'static str,
    /// Symbol of the native currency fees and prices are paid in.
    pub native_symbol: &'static str,
    /// Public JSON-RPC endpoint.
    pub rpc_url: &'static str,
    /// Block explorer base URL.
    pub explorer_url: &'static str,
}

impl NetworkInfo {
    /// Parses the public RPC endpoint.
    ///
    /// # Errors
    ///
    /// Returns the parser error; the built-in endpoints always parse.
    pub fn rpc_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(self.rpc_url)
    }

    /// Explorer page of a transaction.
    #[must_use]
    pub fn tx_url(&self, hash: impl std::fmt::Display) -> String {
        format!("{}/tx/{hash}", self.explorer_url.trim_end_matches('/'))
    }
}

const KNOWN_NETWORKS: [NetworkInfo; 3] = [
    NetworkInfo {
        chain_id: CELO_MAINNET,
        name: "Celo",
        native_symbol: "CELO",
        rpc_url: "https://forno.celo.org",
        explorer_url: "https://celoscan.io",
    },
    NetworkInfo {
        chain_id: CELO_SEPOLIA,
        name: "Celo Sepolia",
        native_symbol: "CELO",
        rpc_url: "https://forno.celo-sepolia.celo-testnet.org",
        explorer_url: "https://celo-sepolia.blockscout.com",
    },
    NetworkInfo {
        chain_id: PASEO_PASSET_HUB,
        name: "Paseo PassetHub",
        native_symbol: "PAS",
        rpc_url: "https://testnet-passet-hub-eth-rpc.polkadot.io",
        explorer_url: "https://blockscout-passet-hub.parity-testnet.parity.io",
    },
];

/// Returns metadata for all known networks.
#[must_use]
pub const fn known_networks() -> &'static [NetworkInfo] {
    &KNOWN_NETWORKS
}

/// Looks up a network by chain id.
#[must_use]
pub fn network(chain_id: ChainId) -> Option<&'static NetworkInfo> {
    KNOWN_NETWORKS.iter().find(|info| info.chain_id == chain_id)
}
