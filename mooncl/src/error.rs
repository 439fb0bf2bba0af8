//! Error types shared by the gateway, the action hooks and the flows.
//!
//! - [`CallError`] - A contract read or write failed
//! - [`SimulationError`] - A dry-run failed, optionally with a revert reason
//! - [`ActionError`] - A user-facing action was refused or failed
//!
//! All three are `Clone`: they are stored in the transaction record and
//! handed to every observer of the tracker.

use alloy_primitives::TxHash;

use crate::amount::AmountError;
use crate::chain::ChainId;

/// A contract call failed before, during or after submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// The ledger could not be reached or answered with a transport-level error.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The contract reverted, in a dry-run or on-chain.
    #[error("Execution reverted: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Reverted {
        /// Decoded revert reason, when the node returned one.
        reason: Option<String>,
    },
    /// The signer refused to sign the transaction.
    #[error("Request rejected by the signer")]
    Rejected,
    /// Return data could not be decoded into the expected type.
    #[error("Failed to decode return data: {0}")]
    Decode(String),
    /// No explicit chain, no bound chain and no connected chain.
    #[error("No chain to target: none was requested and no wallet is connected")]
    NoChain,
    /// The wallet cannot sign for the requested chain.
    #[error("Requested chain {requested} but the wallet is connected to chain {connected}")]
    WrongChain {
        /// Chain the call asked for.
        requested: ChainId,
        /// Chain the wallet is on.
        connected: ChainId,
    },
    /// No account to send from.
    #[error("No account available to send the transaction")]
    NoAccount,
    /// Another write on the same gateway is still being submitted.
    #[error("A transaction is already being submitted")]
    WriteInFlight,
    /// The receipt did not arrive within the configured confirmation timeout.
    #[error("Timed out waiting for confirmation of {0}")]
    ConfirmationTimeout(TxHash),
    /// The transaction disappeared, or the submission was abandoned before a hash came back.
    #[error("Transaction was dropped before confirmation")]
    Dropped,
    /// The transaction record was reset while the call was in flight.
    #[error("Call was cancelled")]
    Cancelled,
}

impl CallError {
    /// Returns the revert reason if this is a revert that carried one.
    #[must_use]
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::Reverted { reason } => reason.as_deref(),
            _ => None,
        }
    }
}

/// A dry-run of a contract call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Simulation failed: {source}")]
pub struct SimulationError {
    /// Underlying call failure.
    #[from]
    pub source: CallError,
}

impl SimulationError {
    /// Returns the revert reason, when the simulation reverted with one.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.source.revert_reason()
    }
}

/// A user-facing action was refused locally or failed on-chain.
///
/// The `Display` output is the message a flow shows to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// The active chain has no registered deployments.
    #[error("Unsupported network (chain {0}). Please switch to a supported network.")]
    UnsupportedChain(ChainId),
    /// No wallet session is connected.
    #[error("Please connect your wallet first.")]
    WalletNotConnected,
    /// A price or payment value could not be converted to an amount.
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),
    /// A listing identifier is not a non-negative integer.
    #[error("Invalid listing id {0:?}")]
    InvalidIdentifier(String),
    /// Publish content is empty after trimming.
    #[error("Content must not be empty.")]
    EmptyContent,
    /// The dynamic fee could not be read, so nothing was written.
    #[error("Failed to read the mint fee: {0}")]
    FeeResolution(#[source] CallError),
    /// A dry-run rejected the action.
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    /// The transaction could not be submitted or failed on-chain.
    #[error(transparent)]
    Call(#[from] CallError),
}
