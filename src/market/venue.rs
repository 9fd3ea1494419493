//! Venue capability set and the registry that dispatches on venue tags.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::kalshi::KalshiClient;
use super::mock::MockVenueClient;
use super::polymarket::PolymarketClient;
use super::types::{MarketRef, Quote, Venue};
use crate::error::MarketError;
use crate::metrics;
use crate::orderbook::LegBooks;

/// Source of batched quote snapshots.
#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    /// Fetch fresh quotes for markets on a single venue.
    ///
    /// Markets the venue no longer prices are simply absent from the result.
    async fn fetch_quotes(&self, venue: Venue, markets: &[MarketRef]) -> Result<Vec<Quote>, MarketError>;

    /// Largest batch the venue accepts in one call.
    fn batch_size(&self, venue: Venue) -> usize {
        venue.max_batch_size()
    }
}

/// Source of yes/no order books for a single market.
#[async_trait]
pub trait OrderBookFetcher: Send + Sync {
    /// Fetch the yes and no books for a market.
    async fn fetch_order_books(&self, market: &MarketRef) -> Result<LegBooks, MarketError>;
}

/// Client for one venue; the variant is picked by venue tag.
#[derive(Debug, Clone)]
pub enum VenueClient {
    /// Polymarket CLOB client.
    Polymarket(PolymarketClient),
    /// Kalshi public market data client.
    Kalshi(KalshiClient),
    /// In-memory client for tests and dry runs.
    Mock(MockVenueClient),
}

impl VenueClient {
    /// Venue served by this client.
    pub fn venue(&self) -> Venue {
        match self {
            VenueClient::Polymarket(_) => Venue::Polymarket,
            VenueClient::Kalshi(_) => Venue::Kalshi,
            VenueClient::Mock(client) => client.venue(),
        }
    }

    /// Fetch quotes for a batch of markets on this venue.
    pub async fn fetch_quotes(&self, markets: &[MarketRef]) -> Result<Vec<Quote>, MarketError> {
        match self {
            VenueClient::Polymarket(client) => client.fetch_quotes(markets).await,
            VenueClient::Kalshi(client) => client.fetch_quotes(markets).await,
            VenueClient::Mock(client) => client.fetch_quotes(markets).await,
        }
    }

    /// Fetch yes and no books for one market on this venue.
    pub async fn fetch_order_books(&self, market: &MarketRef) -> Result<LegBooks, MarketError> {
        match self {
            VenueClient::Polymarket(client) => client.fetch_order_books(market).await,
            VenueClient::Kalshi(client) => client.fetch_order_books(market).await,
            VenueClient::Mock(client) => client.fetch_order_books(market).await,
        }
    }

    /// List active markets, optionally capped at `limit`.
    pub async fn fetch_active_markets(&self, limit: Option<usize>) -> Result<Vec<MarketRef>, MarketError> {
        match self {
            VenueClient::Polymarket(client) => client.fetch_active_markets(limit).await,
            VenueClient::Kalshi(client) => client.fetch_active_markets(limit).await,
            VenueClient::Mock(client) => client.fetch_active_markets(limit).await,
        }
    }
}

/// Venue clients keyed by venue tag.
#[derive(Debug, Clone, Default)]
pub struct VenueRegistry {
    clients: HashMap<Venue, VenueClient>,
}

impl VenueRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, replacing any previous client for its venue.
    pub fn with_client(mut self, client: VenueClient) -> Self {
        self.register(client);
        self
    }

    /// Register a client, replacing any previous client for its venue.
    pub fn register(&mut self, client: VenueClient) {
        self.clients.insert(client.venue(), client);
    }

    /// Client for a venue.
    pub fn client(&self, venue: Venue) -> Result<&VenueClient, MarketError> {
        self.clients.get(&venue).ok_or(MarketError::UnknownVenue(venue))
    }

    /// Registered venues in tag order.
    pub fn venues(&self) -> Vec<Venue> {
        let mut venues: Vec<Venue> = self.clients.keys().copied().collect();
        venues.sort();
        venues
    }
}

#[async_trait]
impl QuoteFetcher for VenueRegistry {
    #[instrument(skip(self, markets), fields(venue = %venue, count = markets.len()))]
    async fn fetch_quotes(&self, venue: Venue, markets: &[MarketRef]) -> Result<Vec<Quote>, MarketError> {
        let start = Instant::now();
        let quotes = self.client(venue)?.fetch_quotes(markets).await;
        metrics::record_quote_fetch_latency(start, venue);

        if let Ok(ref quotes) = quotes {
            debug!(received = quotes.len(), "Quote batch fetched");
        }
        quotes
    }
}

#[async_trait]
impl OrderBookFetcher for VenueRegistry {
    #[instrument(skip(self, market), fields(venue = %market.venue, market_id = %market.market_id))]
    async fn fetch_order_books(&self, market: &MarketRef) -> Result<LegBooks, MarketError> {
        let start = Instant::now();
        let books = self.client(market.venue)?.fetch_order_books(market).await;
        metrics::record_orderbook_fetch_latency(start, market.venue);
        books
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::mock::MockMarket;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn registry_dispatches_by_venue() {
        let kalshi = MockVenueClient::new(Venue::Kalshi);
        kalshi.add_market(MockMarket::priced(
            MarketRef::new(Venue::Kalshi, "K1", "q"),
            dec!(0.4),
            dec!(0.6),
        ));
        let registry = VenueRegistry::new().with_client(VenueClient::Mock(kalshi));

        let quotes = registry
            .fetch_quotes(Venue::Kalshi, &[MarketRef::new(Venue::Kalshi, "K1", "q")])
            .await
            .unwrap();

        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].market_id(), "K1");
    }

    #[tokio::test]
    async fn registry_rejects_unknown_venue() {
        let registry = VenueRegistry::new();
        let result = registry
            .fetch_quotes(Venue::Polymarket, &[MarketRef::new(Venue::Polymarket, "0x1", "q")])
            .await;

        assert!(matches!(result, Err(MarketError::UnknownVenue(Venue::Polymarket))));
    }

    #[test]
    fn default_batch_size_follows_venue() {
        let registry = VenueRegistry::new();
        assert_eq!(registry.batch_size(Venue::Kalshi), 100);
    }
}
