//! Form → Loading → Result state machines driving one action.
//!
//! ```text
//!          submit (guards pass)            tracker success
//!   Form ─────────────────────▶ Loading ─────────────────▶ Result
//!    ▲                             │                          │
//!    └──── tracker error ──────────┘                          │
//!    └──────────────── acknowledge / reopen ──────────────────┘
//! ```
//!
//! An [`ActionFlow`] owns one [`FlowAction`] (and through it one gateway and
//! tracker), a [`WalletSession`] and the shared [`ChainRegistry`]. Guards run
//! in order before leaving `Form`: input well-formed, chain supported, wallet
//! connected. At most one error message is visible at a time.
//!
//! - [`PublishFlow`] - mints a text NFT and shows its score
//! - [`BuyFlow`] - buys a listing and reports the purchased id

mod buy;
mod publish;

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use alloy_primitives::TxHash;

pub use buy::{BuyFlow, BuyOrder, BuyOutcome, BuyRequest};
pub use publish::{PublishDraft, PublishFlow, PublishOutcome, score};

use crate::chain::{ChainId, ChainRegistry};
use crate::error::{ActionError, CallError};
use crate::tracker::{Epoch, TransactionRecord, TransactionTracker};
use crate::wallet::WalletSession;

/// Visible state of a flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlowState {
    /// Collecting input; an error message may be shown.
    #[default]
    Form,
    /// A transaction is being submitted or confirmed.
    Loading,
    /// The transaction confirmed.
    Result,
}

/// Input of the flow transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent {
    /// Guards passed and the action was started.
    Submit,
    /// The action failed.
    Failed,
    /// The transaction confirmed.
    Succeeded,
    /// The user dismissed the result.
    Acknowledge,
    /// The view was closed and reopened.
    Reopen,
}

impl FlowState {
    /// Computes the state that follows `event`, or `None` if the event is not valid here.
    #[must_use]
    pub const fn next(self, event: FlowEvent) -> Option<Self> {
        match (self, event) {
            (_, FlowEvent::Reopen)
            | (Self::Loading, FlowEvent::Failed)
            | (Self::Result, FlowEvent::Acknowledge) => Some(Self::Form),
            (Self::Form, FlowEvent::Submit) => Some(Self::Loading),
            (Self::Loading, FlowEvent::Succeeded) => Some(Self::Result),
            _ => None,
        }
    }
}

/// Progress shown while [`FlowState::Loading`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingStage {
    /// Resolving arguments or broadcasting.
    Submitting,
    /// Broadcast; waiting for the receipt.
    Confirming,
}

/// Error returned by [`ActionFlow::submit`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    /// The flow is not in `Form`.
    #[error("Another action is in progress")]
    Busy,
    /// A guard refused the input; the flow stayed in `Form`.
    #[error(transparent)]
    Rejected(ActionError),
    /// The action failed to submit; the flow went back to `Form`.
    #[error(transparent)]
    Failed(ActionError),
}

/// An action a flow can drive.
pub trait FlowAction: Send + Sync {
    /// What the user submits.
    type Input: Clone + Debug + Send + Sync;
    /// The input once normalized; only this reaches the chain.
    type Validated: Clone + Debug + Send + Sync;
    /// What the flow shows on success.
    type Output: Clone + Debug;

    /// Checks and normalizes the input without touching the chain.
    ///
    /// # Errors
    ///
    /// Returns the local [`ActionError`] describing the problem.
    fn validate(&self, input: &Self::Input) -> Result<Self::Validated, ActionError>;

    /// Points the action at the deployment for `chain_id`.
    ///
    /// # Errors
    ///
    /// Fails if the action's gateway is busy.
    fn bind(&mut self, registry: &ChainRegistry, chain_id: Option<ChainId>)
    -> Result<(), ActionError>;

    /// Tracker of the action's transactions.
    fn tracker(&self) -> &Arc<TransactionTracker>;

    /// Submits the transaction.
    fn submit(
        &self,
        input: &Self::Validated,
    ) -> impl Future<Output = Result<TxHash, ActionError>> + Send;

    /// Derives the displayed outcome from the input and the confirmed record.
    fn settle(input: &Self::Validated, record: &TransactionRecord) -> Self::Output;
}

/// Drives one [`FlowAction`] through Form, Loading and Result.
#[derive(Debug)]
pub struct ActionFlow<A: FlowAction, W> {
    action: A,
    wallet: W,
    registry: Arc<ChainRegistry>,
    state: FlowState,
    error: Option<ActionError>,
    pending: Option<A::Validated>,
    watch_epoch: Option<Epoch>,
    last_hash: Option<TxHash>,
    outcome: Option<A::Output>,
}

impl<A, W> ActionFlow<A, W>
where
    A: FlowAction,
    W: WalletSession,
{
    /// Creates a flow in `Form`.
    pub const fn new(action: A, wallet: W, registry: Arc<ChainRegistry>) -> Self {
        Self {
            action,
            wallet,
            registry,
            state: FlowState::Form,
            error: None,
            pending: None,
            watch_epoch: None,
            last_hash: None,
            outcome: None,
        }
    }

    /// Current state.
    pub const fn state(&self) -> FlowState {
        self.state
    }

    /// The visible error, if any.
    pub const fn error(&self) -> Option<&ActionError> {
        self.error.as_ref()
    }

    /// The visible error message, if any.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// Input of the transaction in flight.
    pub const fn pending(&self) -> Option<&A::Validated> {
        self.pending.as_ref()
    }

    /// Hash of the last confirmed transaction.
    pub const fn last_hash(&self) -> Option<TxHash> {
        self.last_hash
    }

    /// Outcome of the last confirmed transaction.
    pub const fn outcome(&self) -> Option<&A::Output> {
        self.outcome.as_ref()
    }

    /// The driven action.
    pub const fn action(&self) -> &A {
        &self.action
    }

    /// The wallet session.
    pub const fn wallet(&self) -> &W {
        &self.wallet
    }

    /// Tracker of the driven action.
    pub fn tracker(&self) -> &Arc<TransactionTracker> {
        self.action.tracker()
    }

    fn transition(&mut self, event: FlowEvent) {
        if let Some(next) = self.state.next(event) {
            #[cfg(feature = "telemetry")]
            tracing::debug!(from = ?self.state, to = ?next, ?event, "Flow transition");
            self.state = next;
        }
    }

    fn reject(&mut self, error: ActionError) -> FlowError {
        self.error = Some(error.clone());
        FlowError::Rejected(error)
    }

    fn fail(&mut self, error: ActionError) {
        #[cfg(feature = "telemetry")]
        tracing::warn!(%error, "Action failed");
        self.error = Some(error);
        self.pending = None;
        self.watch_epoch = None;
        self.action.tracker().reset();
        self.transition(FlowEvent::Failed);
    }

    /// Runs the guards and, if they pass, submits the action.
    ///
    /// Returns the transaction hash once the ledger accepted the transaction;
    /// the flow then stays in `Loading` until [`observe`](Self::observe) or
    /// [`settle`](Self::settle) sees the outcome.
    ///
    /// # Errors
    ///
    /// - [`FlowError::Busy`] when not in `Form`
    /// - [`FlowError::Rejected`] when a guard refused; a missing wallet also
    ///   triggers a connection attempt
    /// - [`FlowError::Failed`] when submission failed
    pub async fn submit(&mut self, input: A::Input) -> Result<TxHash, FlowError> {
        if self.state != FlowState::Form {
            return Err(FlowError::Busy);
        }
        self.error = None;

        let input = match self.action.validate(&input) {
            Ok(input) => input,
            Err(error) => return Err(self.reject(error)),
        };

        let chain_id = self.wallet.chain_id();
        if let Some(chain_id) = chain_id
            && !self.registry.is_supported(chain_id)
        {
            return Err(self.reject(ActionError::UnsupportedChain(chain_id)));
        }

        if !self.wallet.is_connected() {
            let error = self.reject(ActionError::WalletNotConnected);
            let connected = self.wallet.connect().await;
            #[cfg(feature = "telemetry")]
            if let Err(connect_error) = &connected {
                tracing::warn!(error = %connect_error, "Wallet connection failed");
            }
            drop(connected);
            return Err(error);
        }

        if let Err(error) = self.action.bind(&self.registry, chain_id) {
            return Err(self.reject(error));
        }

        self.pending = Some(input.clone());
        self.transition(FlowEvent::Submit);

        let submitted = {
            let mut in_flight = SubmitInFlight {
                flow: &mut *self,
                armed: true,
            };
            let submitted = in_flight.flow.action.submit(&input).await;
            in_flight.armed = false;
            submitted
        };

        match submitted {
            Ok(hash) => {
                let record = self.action.tracker().snapshot();
                if record.hash != Some(hash) {
                    // Superseded before we could start watching.
                    let error = ActionError::Call(CallError::Cancelled);
                    self.fail(error.clone());
                    return Err(FlowError::Failed(error));
                }
                self.watch_epoch = Some(record.epoch);
                self.observe(&record);
                Ok(hash)
            }
            Err(error) => {
                self.fail(error.clone());
                Err(FlowError::Failed(error))
            }
        }
    }

    /// Applies a tracker snapshot. Returns whether the flow changed state.
    ///
    /// Snapshots of older epochs, or received outside `Loading`, are ignored.
    /// A newer epoch means the tracker was reset underneath the flow, which
    /// fails the attempt as cancelled.
    pub fn observe(&mut self, record: &TransactionRecord) -> bool {
        if self.state != FlowState::Loading {
            return false;
        }
        let Some(epoch) = self.watch_epoch else {
            return false;
        };
        if record.epoch != epoch {
            if record.epoch > epoch {
                self.fail(ActionError::Call(CallError::Cancelled));
                return true;
            }
            return false;
        }
        if record.is_error() {
            let error = record.error.clone().unwrap_or(CallError::Dropped);
            self.fail(ActionError::Call(error));
            return true;
        }
        if record.is_success() {
            let Some(input) = self.pending.take() else {
                return false;
            };
            self.outcome = Some(A::settle(&input, record));
            self.last_hash = record.hash;
            self.watch_epoch = None;
            self.transition(FlowEvent::Succeeded);
            return true;
        }
        false
    }

    /// Waits until the transaction in flight settles and applies the outcome.
    ///
    /// Returns immediately outside `Loading`.
    pub async fn settle(&mut self) -> FlowState {
        let mut rx = self.action.tracker().subscribe();
        while self.state == FlowState::Loading {
            let record = rx.borrow_and_update().clone();
            if self.observe(&record) || self.watch_epoch.is_none() {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.state
    }

    /// Submission progress while `Loading`.
    pub fn loading_stage(&self) -> Option<LoadingStage> {
        (self.state == FlowState::Loading).then(|| {
            if self.action.tracker().is_confirming() {
                LoadingStage::Confirming
            } else {
                LoadingStage::Submitting
            }
        })
    }

    /// Leaves `Result` for a fresh `Form`. Returns `false` outside `Result`.
    pub fn acknowledge(&mut self) -> bool {
        if self.state != FlowState::Result {
            return false;
        }
        self.clear();
        self.transition(FlowEvent::Acknowledge);
        true
    }

    /// Resets the flow as if the view had just been opened.
    pub fn reopen(&mut self) {
        self.clear();
        self.transition(FlowEvent::Reopen);
    }

    fn clear(&mut self) {
        self.action.tracker().reset();
        self.error = None;
        self.pending = None;
        self.watch_epoch = None;
        self.last_hash = None;
        self.outcome = None;
    }

    /// Clears a stale "unsupported chain" message once the wallet is on a usable chain.
    pub fn on_chain_changed(&mut self) {
        let usable = self
            .wallet
            .chain_id()
            .is_none_or(|chain_id| self.registry.is_supported(chain_id));
        if usable && matches!(self.error, Some(ActionError::UnsupportedChain(_))) {
            self.error = None;
        }
    }
}

/// Returns the flow to `Form` if a submission is abandoned before the ledger answered.
struct SubmitInFlight<'a, A: FlowAction, W: WalletSession> {
    flow: &'a mut ActionFlow<A, W>,
    armed: bool,
}

impl<A: FlowAction, W: WalletSession> Drop for SubmitInFlight<'_, A, W> {
    fn drop(&mut self) {
        if self.armed {
            self.flow.fail(ActionError::Call(CallError::Dropped));
        }
    }
}
