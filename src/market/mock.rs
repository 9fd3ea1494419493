//! Mock venue client for unit testing.
//!
//! This module provides a mock client that can be used in tests
//! without making real network requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rust_decimal::Decimal;

use super::types::{MarketRef, Quote, Venue};
use crate::error::MarketError;
use crate::orderbook::{LegBooks, OrderBook, OrderLevel};

/// Mock market data for testing.
#[derive(Debug, Clone)]
pub struct MockMarket {
    /// Current quote.
    pub quote: Quote,
    /// Current books.
    pub books: LegBooks,
}

impl MockMarket {
    /// A market with yes/no asks and matching complementary bids, and empty books.
    pub fn priced(market: MarketRef, yes_ask: Decimal, no_ask: Decimal) -> Self {
        let yes_bid = Decimal::ONE - no_ask;
        let no_bid = Decimal::ONE - yes_ask;
        Self {
            quote: Quote::new(market, yes_ask, no_ask, yes_bid, no_bid),
            books: LegBooks::default(),
        }
    }

    /// Set yes and no ask ladders given as `(price, size)` pairs.
    pub fn with_asks(mut self, yes: &[(Decimal, Decimal)], no: &[(Decimal, Decimal)]) -> Self {
        let ladder = |levels: &[(Decimal, Decimal)]| -> Vec<OrderLevel> {
            levels.iter().map(|&(p, s)| OrderLevel::new(p, s)).collect()
        };
        self.books = LegBooks::new(
            OrderBook::new(ladder(yes), Vec::new()),
            OrderBook::new(ladder(no), Vec::new()),
        );
        self
    }
}

/// Configuration for mock client behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Whether to fail quote requests.
    pub fail_quotes: bool,
    /// Whether to fail order book requests.
    pub fail_order_books: bool,
    /// Whether to fail active market listing.
    pub fail_active_markets: bool,
    /// Simulated latency in milliseconds.
    pub latency_ms: u64,
}

/// Mock venue client for testing.
#[derive(Debug, Clone)]
pub struct MockVenueClient {
    venue: Venue,
    config: MockConfig,
    markets: Arc<Mutex<HashMap<String, MockMarket>>>,
    quote_requests: Arc<AtomicUsize>,
    book_requests: Arc<AtomicUsize>,
}

impl MockVenueClient {
    /// Create a new mock client with default configuration.
    pub fn new(venue: Venue) -> Self {
        Self::with_config(venue, MockConfig::default())
    }

    /// Create a mock client with custom configuration.
    pub fn with_config(venue: Venue, config: MockConfig) -> Self {
        Self {
            venue,
            config,
            markets: Arc::new(Mutex::new(HashMap::new())),
            quote_requests: Arc::new(AtomicUsize::new(0)),
            book_requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Venue this client pretends to be.
    pub fn venue(&self) -> Venue {
        self.venue
    }

    /// Add or replace a mock market.
    pub fn add_market(&self, market: MockMarket) {
        let id = market.quote.market_id().to_string();
        self.markets().insert(id, market);
    }

    /// Remove a market so later fetches no longer return it.
    pub fn remove_market(&self, market_id: &str) -> Option<MockMarket> {
        self.markets().remove(market_id)
    }

    /// Clear all mock data.
    pub fn clear(&self) {
        self.markets().clear();
    }

    /// Number of quote batch requests served.
    pub fn quote_requests(&self) -> usize {
        self.quote_requests.load(Ordering::SeqCst)
    }

    /// Number of order book requests served.
    pub fn book_requests(&self) -> usize {
        self.book_requests.load(Ordering::SeqCst)
    }

    fn markets(&self) -> MutexGuard<'_, HashMap<String, MockMarket>> {
        self.markets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    /// Get mock quotes for the requested markets.
    pub async fn fetch_quotes(&self, requested: &[MarketRef]) -> Result<Vec<Quote>, MarketError> {
        self.simulate_latency().await;
        self.quote_requests.fetch_add(1, Ordering::SeqCst);

        if self.config.fail_quotes {
            return Err(MarketError::FetchFailed {
                venue: self.venue,
                reason: "Mock quote failure".to_string(),
            });
        }

        let markets = self.markets();
        Ok(requested
            .iter()
            .filter_map(|m| markets.get(&m.market_id).map(|mock| mock.quote.clone()))
            .collect())
    }

    /// Get mock order books for a market.
    pub async fn fetch_order_books(&self, market: &MarketRef) -> Result<LegBooks, MarketError> {
        self.simulate_latency().await;
        self.book_requests.fetch_add(1, Ordering::SeqCst);

        if self.config.fail_order_books {
            return Err(MarketError::FetchFailed {
                venue: self.venue,
                reason: "Mock order book failure".to_string(),
            });
        }

        self.markets()
            .get(&market.market_id)
            .map(|mock| mock.books.clone())
            .ok_or_else(|| MarketError::MissingData {
                venue: self.venue,
                market_id: market.market_id.clone(),
                what: "order book",
            })
    }

    /// List mock markets in id order.
    pub async fn fetch_active_markets(&self, limit: Option<usize>) -> Result<Vec<MarketRef>, MarketError> {
        self.simulate_latency().await;

        if self.config.fail_active_markets {
            return Err(MarketError::FetchFailed {
                venue: self.venue,
                reason: "Mock market listing failure".to_string(),
            });
        }

        let mut markets: Vec<MarketRef> = self
            .markets()
            .values()
            .map(|mock| mock.quote.market.clone())
            .collect();
        markets.sort_by(|a, b| a.market_id.cmp(&b.market_id));
        markets.truncate(limit.unwrap_or(usize::MAX));
        Ok(markets)
    }
}
