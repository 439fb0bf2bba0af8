//! Mint and buy operations on top of the contract gateways.
//!
//! - [`MintAction`] - Mints a text NFT, paying the on-chain `mintFee()` unless an amount is given
//! - [`BuyAction`] - Buys a launchpad listing, paying its price
//!
//! Both are stateless between calls; the lifecycle of the submitted
//! transaction lives in the gateway's tracker.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, TxHash, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amount::{self, NATIVE_DECIMALS};
use crate::chain::{ChainId, ChainRegistry};
use crate::contracts::{IAiLaunchpad, IAiTextNft};
use crate::error::{ActionError, CallError};
use crate::gateway::{CallDescriptor, ContractGateway, GatewayConfig, Ledger};
use crate::tracker::TransactionTracker;

/// Gateway bound to the text NFT contract.
pub type NftGateway<L> = ContractGateway<L, IAiTextNft::IAiTextNftCalls>;

/// Gateway bound to the launchpad contract.
pub type LaunchpadGateway<L> = ContractGateway<L, IAiLaunchpad::IAiLaunchpadCalls>;

/// Arguments of a mint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MintArgs {
    /// Text stored in the NFT.
    pub content: String,
    /// Explicit payment. When `None`, the current `mintFee()` is paid.
    pub value: Option<U256>,
    /// Sender override.
    pub account: Option<Address>,
    /// Chain override.
    pub chain_id: Option<ChainId>,
}

impl MintArgs {
    /// Mint `content`, paying the current fee.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Pays `value` instead of reading the fee.
    #[must_use]
    pub const fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    /// Sends from `account`.
    #[must_use]
    pub const fn with_account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self
    }

    /// Targets `chain_id`.
    #[must_use]
    pub const fn on_chain(mut self, chain_id: Option<ChainId>) -> Self {
        self.chain_id = chain_id;
        self
    }
}

/// Mints text NFTs.
#[derive(Debug)]
pub struct MintAction<L> {
    gateway: NftGateway<L>,
}

impl<L: Ledger + 'static> MintAction<L> {
    /// Wraps an NFT gateway.
    pub const fn new(gateway: NftGateway<L>) -> Self {
        Self { gateway }
    }

    /// Builds the action for the NFT deployment registered on `chain_id`.
    pub fn for_chain(
        ledger: Arc<L>,
        registry: &ChainRegistry,
        chain_id: Option<ChainId>,
        config: GatewayConfig,
    ) -> Self {
        let gateway = NftGateway::new(ledger, registry.nft_address(chain_id))
            .with_chain(chain_id)
            .with_config(config);
        Self::new(gateway)
    }

    /// The underlying gateway.
    pub const fn gateway(&self) -> &NftGateway<L> {
        &self.gateway
    }

    /// Mutable access to the gateway, e.g. to rebind it.
    pub const fn gateway_mut(&mut self) -> &mut NftGateway<L> {
        &mut self.gateway
    }

    /// The tracker of submitted mints.
    pub const fn tracker(&self) -> &Arc<TransactionTracker> {
        self.gateway.tracker()
    }

    /// Reads the current mint fee.
    ///
    /// # Errors
    ///
    /// Returns the [`CallError`] of the view call.
    pub async fn mint_fee(&self, chain_id: Option<ChainId>) -> Result<U256, CallError> {
        self.gateway
            .read(CallDescriptor::new(IAiTextNft::mintFeeCall {}).on_chain(chain_id))
            .await
    }

    async fn resolve_value(&self, args: &MintArgs) -> Result<U256, ActionError> {
        match args.value {
            Some(value) => Ok(value),
            None => self
                .mint_fee(args.chain_id)
                .await
                .map_err(ActionError::FeeResolution),
        }
    }

    fn descriptor(args: MintArgs, value: U256) -> CallDescriptor<IAiTextNft::mintCall> {
        CallDescriptor::new(IAiTextNft::mintCall {
            content: args.content,
        })
        .with_value(value)
        .with_account(args.account)
        .on_chain(args.chain_id)
    }

    /// Submits `mint(content)`, returning the transaction hash.
    ///
    /// Without an explicit value the fee is read first; if that read fails
    /// nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::FeeResolution`] when the fee cannot be read, and
    /// [`ActionError::Call`] when the write fails.
    pub async fn mint(&self, args: MintArgs) -> Result<TxHash, ActionError> {
        let value = self.resolve_value(&args).await?;
        #[cfg(feature = "telemetry")]
        tracing::debug!(fee = %value, chain = ?args.chain_id, "Submitting mint");
        Ok(self.gateway.write(Self::descriptor(args, value)).await?)
    }

    /// Dry-runs a mint and returns the token id it would create.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::FeeResolution`] when the fee cannot be read, and
    /// [`ActionError::Simulation`] when the dry-run fails.
    pub async fn simulate_mint(&self, args: MintArgs) -> Result<U256, ActionError> {
        let value = self.resolve_value(&args).await?;
        Ok(self.gateway.simulate(Self::descriptor(args, value)).await?)
    }
}

/// Identifier of a launchpad listing, as received from callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListingId {
    /// Already an integer.
    Int(u64),
    /// Decimal digits, or `0x`-prefixed hex.
    Text(String),
}

impl ListingId {
    /// Normalizes the identifier to the contract's integer type.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::InvalidIdentifier`] for empty or non-numeric text.
    pub fn to_u256(&self) -> Result<U256, ActionError> {
        let text = match self {
            Self::Int(id) => return Ok(U256::from(*id)),
            Self::Text(text) => text.trim(),
        };
        let invalid = || ActionError::InvalidIdentifier(text.to_owned());
        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            return U256::from_str_radix(hex, 16).map_err(|_| invalid());
        }
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        U256::from_str_radix(text, 10).map_err(|_| invalid())
    }
}

impl From<u64> for ListingId {
    fn from(id: u64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for ListingId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_owned())
    }
}

impl From<String> for ListingId {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

/// A payment amount as received from callers.
///
/// Every variant except [`PriceInput::Wei`] is expressed in whole native
/// units (e.g. `"0.5"` CELO) and converted with [`amount`].
#[derive(Debug, Clone, PartialEq)]
pub enum PriceInput {
    /// Already in wei.
    Wei(U256),
    /// Decimal text, e.g. from a form field.
    Text(String),
    /// A float, e.g. a JSON price from the listing API.
    Float(f64),
    /// An exact decimal.
    Decimal(Decimal),
}

impl PriceInput {
    /// Converts the price to wei.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::InvalidAmount`] for non-numeric, non-finite or
    /// negative prices.
    pub fn to_amount(&self) -> Result<U256, ActionError> {
        let wei = match self {
            Self::Wei(wei) => *wei,
            Self::Text(text) => amount::parse_units(text, NATIVE_DECIMALS)?,
            Self::Float(value) => amount::from_f64(*value, NATIVE_DECIMALS)?,
            Self::Decimal(value) => amount::from_decimal(*value, NATIVE_DECIMALS)?,
        };
        Ok(wei)
    }
}

impl From<U256> for PriceInput {
    fn from(wei: U256) -> Self {
        Self::Wei(wei)
    }
}

impl From<f64> for PriceInput {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Decimal> for PriceInput {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<&str> for PriceInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Arguments of a purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyArgs {
    /// Listing to buy.
    pub listing_id: ListingId,
    /// Price to pay.
    pub price: PriceInput,
    /// Sender override.
    pub account: Option<Address>,
    /// Chain override.
    pub chain_id: Option<ChainId>,
}

impl BuyArgs {
    /// Buy `listing_id` for `price`.
    pub fn new(listing_id: impl Into<ListingId>, price: impl Into<PriceInput>) -> Self {
        Self {
            listing_id: listing_id.into(),
            price: price.into(),
            account: None,
            chain_id: None,
        }
    }

    /// Targets `chain_id`.
    #[must_use]
    pub const fn on_chain(mut self, chain_id: Option<ChainId>) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Sends from `account`.
    #[must_use]
    pub const fn with_account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self
    }

    fn descriptor(&self) -> Result<CallDescriptor<IAiLaunchpad::buyCall>, ActionError> {
        let listing_id = self.listing_id.to_u256()?;
        let value = self.price.to_amount()?;
        Ok(CallDescriptor::new(IAiLaunchpad::buyCall {
            listingId: listing_id,
        })
        .with_value(value)
        .with_account(self.account)
        .on_chain(self.chain_id))
    }
}

/// Buys launchpad listings.
#[derive(Debug)]
pub struct BuyAction<L> {
    gateway: LaunchpadGateway<L>,
}

impl<L: Ledger + 'static> BuyAction<L> {
    /// Wraps a launchpad gateway.
    pub const fn new(gateway: LaunchpadGateway<L>) -> Self {
        Self { gateway }
    }

    /// Builds the action for the launchpad deployment registered on `chain_id`.
    pub fn for_chain(
        ledger: Arc<L>,
        registry: &ChainRegistry,
        chain_id: Option<ChainId>,
        config: GatewayConfig,
    ) -> Self {
        let gateway = LaunchpadGateway::new(ledger, registry.launchpad_address(chain_id))
            .with_chain(chain_id)
            .with_config(config);
        Self::new(gateway)
    }

    /// The underlying gateway.
    pub const fn gateway(&self) -> &LaunchpadGateway<L> {
        &self.gateway
    }

    /// Mutable access to the gateway, e.g. to rebind it.
    pub const fn gateway_mut(&mut self) -> &mut LaunchpadGateway<L> {
        &mut self.gateway
    }

    /// The tracker of submitted purchases.
    pub const fn tracker(&self) -> &Arc<TransactionTracker> {
        self.gateway.tracker()
    }

    /// Submits `buy(listingId)` paying the price.
    ///
    /// Arguments are normalized before anything is sent; on a normalization
    /// error the tracker is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::InvalidIdentifier`] or [`ActionError::InvalidAmount`]
    /// for malformed arguments and [`ActionError::Call`] when the write fails.
    pub async fn buy(&self, args: &BuyArgs) -> Result<TxHash, ActionError> {
        let descriptor = args.descriptor()?;
        #[cfg(feature = "telemetry")]
        tracing::debug!(listing = %descriptor.call.listingId, value = %descriptor.value, "Submitting buy");
        Ok(self.gateway.write(descriptor).await?)
    }

    /// Dry-runs a purchase.
    ///
    /// # Errors
    ///
    /// Same as [`BuyAction::buy`], with dry-run failures as [`ActionError::Simulation`].
    pub async fn simulate_buy(&self, args: &BuyArgs) -> Result<(), ActionError> {
        let descriptor = args.descriptor()?;
        self.gateway.simulate(descriptor).await?;
        Ok(())
    }
}
