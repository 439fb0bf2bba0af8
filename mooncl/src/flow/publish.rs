use alloy_primitives::TxHash;

use super::{ActionFlow, FlowAction};
use crate::actions::{MintAction, MintArgs};
use crate::chain::{ChainId, ChainRegistry};
use crate::error::ActionError;
use crate::gateway::Ledger;
use crate::tracker::{TransactionRecord, TransactionTracker};

use std::sync::Arc;

/// Longest content, in characters, that still raises the score.
const SCORE_CAP_CHARS: u32 = 500;

/// Text the user wants to publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishDraft {
    /// Raw content; surrounding whitespace is trimmed before minting.
    pub content: String,
}

impl PublishDraft {
    /// A draft holding `content`.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

impl From<&str> for PublishDraft {
    fn from(content: &str) -> Self {
        Self::new(content)
    }
}

/// What a successful publish shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Display score in `65..=95`.
    pub score: u8,
    /// The minted content.
    pub content: String,
}

/// Display score of published content: `65 + round(min(len, 500) / 500 * 30)`,
/// counting characters of the trimmed text.
#[must_use]
pub fn score(content: &str) -> u8 {
    let chars = u32::try_from(content.trim().chars().count()).unwrap_or(u32::MAX);
    let len = chars.min(SCORE_CAP_CHARS);
    // len * 30 / 500 rounded half up, in integers.
    let bonus = (len * 3 + 25) / 50;
    65 + u8::try_from(bonus).unwrap_or(30)
}

impl<L: Ledger + 'static> FlowAction for MintAction<L> {
    type Input = PublishDraft;
    type Validated = PublishDraft;
    type Output = PublishOutcome;

    fn validate(&self, input: &PublishDraft) -> Result<PublishDraft, ActionError> {
        let content = input.content.trim();
        if content.is_empty() {
            return Err(ActionError::EmptyContent);
        }
        Ok(PublishDraft::new(content))
    }

    fn bind(&mut self, registry: &ChainRegistry, chain_id: Option<ChainId>) -> Result<(), ActionError> {
        self.gateway_mut()
            .rebind(registry.nft_address(chain_id), chain_id)
            .map_err(ActionError::Call)
    }

    fn tracker(&self) -> &Arc<TransactionTracker> {
        self.gateway().tracker()
    }

    async fn submit(&self, input: &PublishDraft) -> Result<TxHash, ActionError> {
        self.mint(MintArgs::new(input.content.clone())).await
    }

    fn settle(input: &PublishDraft, _record: &TransactionRecord) -> PublishOutcome {
        PublishOutcome {
            score: score(&input.content),
            content: input.content.clone(),
        }
    }
}

/// Publish view: mints the draft and shows its score.
pub type PublishFlow<L, W> = ActionFlow<MintAction<L>, W>;
