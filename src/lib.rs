//! Cross-venue arbitrage scanner for binary prediction markets.
//!
//! The same question is often listed on several venues. Buying the cheapest
//! yes on one venue and the cheapest no on another pays out one contract
//! whichever way the question resolves, so a combined cost below one is a
//! locked-in return:
//!
//! ```text
//! Kalshi     yes ask: 0.40
//! Polymarket no ask:  0.45
//! ─────────────────────────
//! Cost:               0.85 < 1.00
//! Return:             1 / 0.85 - 1 = 17.6%
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`market`]: Venue tags, quotes and venue clients
//! - [`orderbook`]: Order books and fill price calculations
//! - [`arbitrage`]: Return calculations, opportunities and ranking
//! - [`equivalence`]: Matching questions across venues
//! - [`store`]: Building, refreshing and persisting opportunities
//! - [`scan`]: Periodic scan loop and strategies
//! - [`api`]: HTTP API over the opportunity store
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod arbitrage;
pub mod config;
pub mod equivalence;
pub mod error;
pub mod market;
pub mod metrics;
pub mod orderbook;
pub mod scan;
pub mod store;
pub mod utils;

pub use config::Config;
pub use error::{Result, ScannerError};
