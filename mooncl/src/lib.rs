#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Contract interaction and transaction lifecycle for the Mooncl market.
//!
//! This crate contains the chain-agnostic core: it knows how to encode typed
//! contract calls, submit them through a [`Ledger`](gateway::Ledger), follow the
//! resulting transaction until it settles, and drive user-facing actions
//! (publishing an opinion NFT, buying a listing) through explicit state machines.
//!
//! The actual JSON-RPC backend lives in `mooncl-evm`, and the REST client for
//! ranking/detail lookups lives in `mooncl-http`.
//!
//! # Modules
//!
//! - [`amount`] - Decimal input to canonical integer amount conversion
//! - [`chain`] - Chain identifiers and the contract address registry
//! - [`contracts`] - Solidity interfaces of the deployed contracts
//! - [`gateway`] - Typed read/simulate/write access to one contract binding
//! - [`tracker`] - Lifecycle of the in-flight transaction of a gateway
//! - [`actions`] - Mint and buy operations built on the gateway
//! - [`flow`] - Form/Loading/Result state machines driving one action
//! - [`listing`] - Ranking/detail data contract and latest-response loaders
//! - [`sequence`] - Monotonic request tokens for discarding stale results
//! - [`wallet`] - Wallet session abstraction used by the flows
//! - [`config`] - Environment-driven configuration
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation
//! - `test-utils` - Exposes the in-memory `testing` doubles for downstream tests

pub mod actions;
pub mod amount;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod flow;
pub mod gateway;
pub mod listing;
pub mod sequence;
pub mod tracker;
pub mod wallet;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{ActionError, CallError, SimulationError};
