#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EVM backend for the Mooncl contracts.
//!
//! - [`RpcLedger`] - [`Ledger`](mooncl::gateway::Ledger) and
//!   [`WalletSession`](mooncl::wallet::WalletSession) over HTTP JSON-RPC, signing
//!   with a local private key
//! - [`networks`] - Public metadata (RPC endpoint, explorer, native symbol) of
//!   the chains the contracts are deployed on
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

mod ledger;
pub mod networks;

pub use ledger::{DEFAULT_POLL_INTERVAL, LedgerError, RpcLedger, call_error};
pub use networks::{NetworkInfo, known_networks, network};
