//! Market module for cross-venue binary markets.
//!
//! This module handles:
//! - Venue tags, market references and quote snapshots
//! - Polymarket and Kalshi market data clients
//! - The venue registry that fetches quotes and order books by venue tag
//! - Mock client for testing

pub mod kalshi;
pub mod mock;
pub mod polymarket;
pub mod types;
pub mod venue;

pub use kalshi::KalshiClient;
pub use mock::{MockConfig, MockMarket, MockVenueClient};
pub use polymarket::PolymarketClient;
pub use types::{MarketKey, MarketRef, Quote, Venue};
pub use venue::{OrderBookFetcher, QuoteFetcher, VenueClient, VenueRegistry};
