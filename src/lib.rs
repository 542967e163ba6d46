//! A Rust client for [Unleash](https://www.getunleash.io/) feature toggles.
//!
//! # Overview
//!
//! The client revolves around a [`Client`] that answers whether a named feature is enabled for a
//! request [`Context`]. Feature definitions are fetched from the Unleash server, kept in memory for
//! a TTL and persisted to a [`Cache`]. Each feature lists activation strategies; the feature is on
//! as soon as one of them returns `true`. Strategies are looked up by name in a
//! [`StrategyRegistry`], which knows the always-on `"default"` strategy out of the box.
//!
//! [`FeatureStore`] is the central authority on which definitions are active. Once its snapshot
//! expires it reads through the durable cache, fetches from the server on a miss, and, if fetching
//! fails and failover is enabled, falls back to the last successfully fetched set.
//!
//! To keep request latency low, call [`RefreshTrigger::request_finished`] after each response has
//! been sent. It refreshes the cache in a background thread before the TTL runs out.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Unknown features and unknown strategies evaluate to "off" rather than failing. Errors are
//! returned for fetch failures without failover and for misconfigured strategies, which usually
//! indicate that developer's attention is needed.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging
//! messages under the `unleash` target. Consider integrating a `log`-compatible logger
//! implementation for better visibility into client operations.
//!
//! # Examples
//!
//! See `demos/simple` in the crate repository.

#![warn(rustdoc::missing_crate_level_docs)]

mod cache;
mod client;
mod clock;
mod config;
mod context;
mod error;
mod eval;
mod features;
mod fetcher;
mod refresh;
mod store;
mod strategy;
#[cfg(test)]
mod test_support;

pub use cache::{Cache, InMemoryCache, CACHE_KEY, FAILOVER_KEY};
pub use client::Client;
pub use clock::{Clock, SystemClock};
pub use config::{CacheConfig, ClientConfig};
pub use context::Context;
pub use error::{Error, Result};
pub use features::{FeatureDefinition, FeatureSet, Parameters, StrategyConfig};
pub use fetcher::{FeatureFetcher, HttpFetcher};
pub use refresh::RefreshTrigger;
pub use store::FeatureStore;
pub use strategy::{
    AnyStrategy, DefaultStrategy, DynamicStrategy, Strategy, StrategyError, StrategyRegistry,
};
