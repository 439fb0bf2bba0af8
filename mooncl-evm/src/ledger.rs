//! JSON-RPC ledger backed by an alloy provider.
//!
//! [`RpcLedger`] implements both [`Ledger`] and [`WalletSession`]: the
//! configured private key plays the role of the connected wallet, and the
//! node's `eth_chainId` is the wallet's chain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy_primitives::{Address, Bytes, TxHash};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::{LocalSignerError, PrivateKeySigner};
use alloy_sol_types::decode_revert_reason;
use alloy_transport::TransportError;
use mooncl::chain::ChainId;
use mooncl::error::CallError;
use mooncl::gateway::{Ledger, LedgerRequest};
use mooncl::tracker::Receipt;
use mooncl::wallet::{WalletError, WalletSession};
use url::Url;

/// Interval between receipt lookups while a transaction is pending.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// EIP-1193 code for a request the user refused.
const USER_REJECTED_CODE: i64 = 4001;

/// Chain id value meaning "not fetched yet".
const CHAIN_UNKNOWN: u64 = 0;

/// Error building an [`RpcLedger`].
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The signing key is not a valid secp256k1 private key.
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(#[from] LocalSignerError),
    /// The node could not be reached while connecting.
    #[error("Failed to query the chain id: {0}")]
    ChainId(#[source] TransportError),
}

/// [`Ledger`] talking to one EVM node over HTTP JSON-RPC.
#[derive(Debug)]
pub struct RpcLedger {
    provider: DynProvider,
    account: Option<Address>,
    chain_id: AtomicU64,
    poll_interval: Duration,
}

impl RpcLedger {
    /// Read-only ledger: calls and simulations work, sends fail with [`CallError::NoAccount`].
    #[must_use]
    pub fn read_only(rpc_url: Url) -> Self {
        let provider = ProviderBuilder::new().connect_http(rpc_url).erased();
        Self::from_parts(provider, None)
    }

    /// Ledger that signs with `signer`.
    #[must_use]
    pub fn with_signer(rpc_url: Url, signer: PrivateKeySigner) -> Self {
        let account = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(rpc_url)
            .erased();
        Self::from_parts(provider, Some(account))
    }

    /// Ledger that signs with the hex-encoded `private_key`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidPrivateKey`] if the key does not parse.
    pub fn from_private_key(rpc_url: Url, private_key: &str) -> Result<Self, LedgerError> {
        let signer: PrivateKeySigner = private_key.trim().parse()?;
        Ok(Self::with_signer(rpc_url, signer))
    }

    fn from_parts(provider: DynProvider, account: Option<Address>) -> Self {
        #[cfg(feature = "telemetry")]
        tracing::info!(account = ?account, "Using JSON-RPC ledger");
        Self {
            provider,
            account,
            chain_id: AtomicU64::new(CHAIN_UNKNOWN),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the receipt polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Records the chain without asking the node, e.g. from configuration.
    #[must_use]
    pub fn with_chain_id(self, chain_id: ChainId) -> Self {
        self.chain_id.store(chain_id, Ordering::Release);
        self
    }

    /// The underlying provider.
    pub const fn provider(&self) -> &DynProvider {
        &self.provider
    }

    /// Asks the node for its chain id and remembers it.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ChainId`] if the node cannot be reached.
    pub async fn refresh_chain(&self) -> Result<ChainId, LedgerError> {
        let chain_id = self
            .provider
            .get_chain_id()
            .await
            .map_err(LedgerError::ChainId)?;
        self.chain_id.store(chain_id, Ordering::Release);
        #[cfg(feature = "telemetry")]
        tracing::debug!(chain = chain_id, "Node chain id");
        Ok(chain_id)
    }

    fn known_chain(&self) -> Option<ChainId> {
        match self.chain_id.load(Ordering::Acquire) {
            CHAIN_UNKNOWN => None,
            chain_id => Some(chain_id),
        }
    }

    fn check_chain(&self, requested: ChainId) -> Result<(), CallError> {
        match self.known_chain() {
            Some(connected) if connected != requested => {
                Err(CallError::WrongChain { requested, connected })
            }
            _ => Ok(()),
        }
    }
}

/// Builds the JSON-RPC transaction for `request`.
fn transaction(request: LedgerRequest, from: Option<Address>) -> TransactionRequest {
    let tx = TransactionRequest::default()
        .with_to(request.to)
        .with_input(request.input)
        .with_value(request.value);
    match request.from.or(from) {
        Some(from) => tx.with_from(from),
        None => tx,
    }
}

/// Maps a transport failure to a [`CallError`], decoding revert reasons when the node sent them.
pub fn call_error(error: &TransportError) -> CallError {
    if let Some(payload) = error.as_error_resp() {
        if let Some(data) = payload.as_revert_data() {
            return CallError::Reverted {
                reason: decode_revert_reason(&data),
            };
        }
        let message: &str = &payload.message;
        if let Some(rest) = message.strip_prefix("execution reverted") {
            let reason = rest.trim_start_matches(':').trim();
            return CallError::Reverted {
                reason: (!reason.is_empty()).then(|| reason.to_owned()),
            };
        }
        if payload.code == USER_REJECTED_CODE {
            return CallError::Rejected;
        }
    }
    CallError::Transport(error.to_string())
}

fn receipt<R: ReceiptResponse>(receipt: &R) -> Receipt {
    Receipt {
        transaction_hash: receipt.transaction_hash(),
        block_number: receipt.block_number(),
        success: receipt.status(),
        gas_used: receipt.gas_used(),
    }
}

impl Ledger for RpcLedger {
    fn connected_chain(&self) -> Option<ChainId> {
        self.known_chain()
    }

    fn connected_account(&self) -> Option<Address> {
        self.account
    }

    async fn call(&self, request: LedgerRequest) -> Result<Bytes, CallError> {
        self.check_chain(request.chain_id)?;
        let tx = transaction(request, None);
        self.provider.call(tx).await.map_err(|e| call_error(&e))
    }

    async fn simulate(&self, request: LedgerRequest) -> Result<Bytes, CallError> {
        self.check_chain(request.chain_id)?;
        let tx = transaction(request, self.account);
        self.provider.call(tx).await.map_err(|e| call_error(&e))
    }

    async fn send(&self, request: LedgerRequest) -> Result<TxHash, CallError> {
        self.check_chain(request.chain_id)?;
        let account = self.account.ok_or(CallError::NoAccount)?;
        let chain_id = request.chain_id;
        let tx = transaction(request, Some(account)).with_chain_id(chain_id);
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| call_error(&e))?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(&self, chain_id: ChainId, hash: TxHash) -> Result<Receipt, CallError> {
        self.check_chain(chain_id)?;
        loop {
            let found = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| call_error(&e))?;
            if let Some(found) = found {
                #[cfg(feature = "telemetry")]
                tracing::debug!(tx = %hash, block = ?found.block_number(), "Receipt found");
                return Ok(receipt(&found));
            }
            #[cfg(feature = "telemetry")]
            tracing::trace!(tx = %hash, "Receipt not available yet");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl WalletSession for RpcLedger {
    fn is_connected(&self) -> bool {
        self.account.is_some()
    }

    fn account(&self) -> Option<Address> {
        self.account
    }

    fn chain_id(&self) -> Option<ChainId> {
        self.known_chain()
    }

    async fn connect(&self) -> Result<(), WalletError> {
        if self.account.is_none() {
            return Err(WalletError::Unavailable("no signing key configured".into()));
        }
        self.refresh_chain()
            .await
            .map(|_| ())
            .map_err(|e| WalletError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{U256, hex};
    use alloy_sol_types::{Revert, SolError};
    use mooncl::chain::{CELO_MAINNET, CELO_SEPOLIA};

    // Anvil's first development key.
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn rpc_url() -> Url {
        Url::parse("http://127.0.0.1:1").unwrap()
    }

    fn error_response(json: &str) -> TransportError {
        TransportError::ErrorResp(serde_json::from_str(json).unwrap())
    }

    fn request(chain_id: ChainId) -> LedgerRequest {
        LedgerRequest {
            to: Address::repeat_byte(0x22),
            input: Bytes::new(),
            value: U256::ZERO,
            from: None,
            chain_id,
        }
    }

    #[test]
    fn test_private_key_sets_account() {
        let ledger = RpcLedger::from_private_key(rpc_url(), DEV_KEY).unwrap();
        assert_eq!(
            ledger.account(),
            Some("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap())
        );
        assert!(ledger.is_connected());
        assert_eq!(ledger.chain_id(), None);

        let err = RpcLedger::from_private_key(rpc_url(), "0x1234").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPrivateKey(_)));
    }

    #[test]
    fn test_revert_data_is_decoded() {
        let data = hex::encode_prefixed(Revert {
            reason: "sold out".into(),
        }
        .abi_encode());
        let error = error_response(&format!(
            r#"{{"code":3,"message":"execution reverted: sold out","data":"{data}"}}"#
        ));
        assert_eq!(
            call_error(&error),
            CallError::Reverted {
                reason: Some("sold out".into())
            }
        );
    }

    #[test]
    fn test_revert_message_without_data() {
        let error = error_response(r#"{"code":-32000,"message":"execution reverted: not listed"}"#);
        assert_eq!(call_error(&error).revert_reason(), Some("not listed"));

        let error = error_response(r#"{"code":-32000,"message":"execution reverted"}"#);
        assert_eq!(call_error(&error), CallError::Reverted { reason: None });
    }

    #[test]
    fn test_other_errors() {
        let error = error_response(r#"{"code":4001,"message":"User denied transaction"}"#);
        assert_eq!(call_error(&error), CallError::Rejected);

        let error = error_response(r#"{"code":-32000,"message":"insufficient funds"}"#);
        assert!(matches!(call_error(&error), CallError::Transport(msg) if msg.contains("insufficient funds")));
    }

    #[tokio::test]
    async fn test_read_only_ledger_cannot_send() {
        let ledger = RpcLedger::read_only(rpc_url());
        assert!(!ledger.is_connected());
        assert_eq!(ledger.send(request(CELO_SEPOLIA)).await, Err(CallError::NoAccount));
        assert!(matches!(
            ledger.connect().await,
            Err(WalletError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_chain_is_refused_before_rpc() {
        let ledger = RpcLedger::from_private_key(rpc_url(), DEV_KEY)
            .unwrap()
            .with_chain_id(CELO_SEPOLIA);
        assert_eq!(ledger.connected_chain(), Some(CELO_SEPOLIA));
        assert_eq!(
            ledger.send(request(CELO_MAINNET)).await,
            Err(CallError::WrongChain {
                requested: CELO_MAINNET,
                connected: CELO_SEPOLIA
            })
        );
        assert!(matches!(
            ledger.wait_for_receipt(CELO_MAINNET, TxHash::ZERO).await,
            Err(CallError::WrongChain { .. })
        ));
    }
}
