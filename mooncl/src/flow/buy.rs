use std::sync::Arc;

use alloy_primitives::{TxHash, U256};

use super::{ActionFlow, FlowAction};
use crate::actions::{BuyAction, BuyArgs, ListingId, PriceInput};
use crate::chain::{ChainId, ChainRegistry};
use crate::error::ActionError;
use crate::gateway::Ledger;
use crate::listing::NftDetail;
use crate::tracker::{TransactionRecord, TransactionTracker};

/// A purchase the user confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyRequest {
    /// Listing to buy.
    pub listing_id: ListingId,
    /// Price to pay.
    pub price: PriceInput,
}

impl BuyRequest {
    /// Buy `listing_id` for `price`.
    pub fn new(listing_id: impl Into<ListingId>, price: impl Into<PriceInput>) -> Self {
        Self {
            listing_id: listing_id.into(),
            price: price.into(),
        }
    }

    /// Buys the listing shown in a detail view at its displayed price.
    #[must_use]
    pub fn from_detail(detail: &NftDetail) -> Self {
        Self::new(detail.token_id, detail.evaluate_price)
    }
}

/// A purchase normalized to contract units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuyOrder {
    /// Listing to buy.
    pub listing_id: U256,
    /// Payment, in wei.
    pub price: U256,
}

/// What a successful purchase shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuyOutcome {
    /// The purchased listing.
    pub listing_id: U256,
    /// Amount paid, in wei.
    pub paid: U256,
}

impl<L: Ledger + 'static> FlowAction for BuyAction<L> {
    type Input = BuyRequest;
    type Validated = BuyOrder;
    type Output = BuyOutcome;

    fn validate(&self, input: &BuyRequest) -> Result<BuyOrder, ActionError> {
        Ok(BuyOrder {
            listing_id: input.listing_id.to_u256()?,
            price: input.price.to_amount()?,
        })
    }

    fn bind(&mut self, registry: &ChainRegistry, chain_id: Option<ChainId>) -> Result<(), ActionError> {
        self.gateway_mut()
            .rebind(registry.launchpad_address(chain_id), chain_id)
            .map_err(ActionError::Call)
    }

    fn tracker(&self) -> &Arc<TransactionTracker> {
        self.gateway().tracker()
    }

    async fn submit(&self, order: &BuyOrder) -> Result<TxHash, ActionError> {
        self.buy(&BuyArgs::new(order.listing_id.to_string(), order.price))
            .await
    }

    fn settle(order: &BuyOrder, _record: &TransactionRecord) -> BuyOutcome {
        BuyOutcome {
            listing_id: order.listing_id,
            paid: order.price,
        }
    }
}

/// Detail view purchase: buys the listing and reports the purchased id.
pub type BuyFlow<L, W> = ActionFlow<BuyAction<L>, W>;
