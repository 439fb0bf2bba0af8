#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP client for the Mooncl listing API.
//!
//! [`NftApiClient`] implements the [`RankingSource`](mooncl::listing::RankingSource)
//! and [`DetailSource`](mooncl::listing::DetailSource) interfaces of the core
//! crate, so it plugs directly into
//! [`RankingPager`](mooncl::listing::RankingPager) and
//! [`DetailLoader`](mooncl::listing::DetailLoader).
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing spans on every request

pub mod client;
pub mod error;

pub use client::NftApiClient;
pub use error::FetchError;
