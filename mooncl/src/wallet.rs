//! Wallet session abstraction.
//!
//! The flows only need to know whether a wallet is connected, which chain it
//! is on, and how to ask it to connect. Connection UI is someone else's job.

use std::future::Future;
use std::sync::Arc;

use alloy_primitives::Address;

use crate::chain::ChainId;

/// Error returned by [`WalletSession::connect`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    /// The user declined the connection request.
    #[error("Wallet connection was rejected")]
    Rejected,
    /// No wallet could be reached.
    #[error("Wallet unavailable: {0}")]
    Unavailable(String),
}

/// A connected (or connectable) wallet.
pub trait WalletSession: Send + Sync {
    /// Returns `true` when an account is available for signing.
    fn is_connected(&self) -> bool;

    /// The active account, if connected.
    fn account(&self) -> Option<Address>;

    /// The chain the wallet is currently on, if known.
    fn chain_id(&self) -> Option<ChainId>;

    /// Asks the wallet to connect.
    fn connect(&self) -> impl Future<Output = Result<(), WalletError>> + Send;
}

impl<T: WalletSession> WalletSession for Arc<T> {
    fn is_connected(&self) -> bool {
        self.as_ref().is_connected()
    }

    fn account(&self) -> Option<Address> {
        self.as_ref().account()
    }

    fn chain_id(&self) -> Option<ChainId> {
        self.as_ref().chain_id()
    }

    fn connect(&self) -> impl Future<Output = Result<(), WalletError>> + Send {
        self.as_ref().connect()
    }
}
