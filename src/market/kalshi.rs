//! Kalshi public market data client.
//!
//! Kalshi quotes prices in integer cents and publishes only bids in its
//! order book; asks on one outcome are derived from bids on the other.

use std::collections::HashSet;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use super::types::{MarketRef, Quote, Venue};
use crate::config::Config;
use crate::error::MarketError;
use crate::orderbook::{LegBooks, OrderBook, OrderLevel};

/// Page size and ticker cap for listing requests.
const REQUEST_LIMIT: usize = 100;

const CENTS: Decimal = Decimal::ONE_HUNDRED;

/// Kalshi trade API client.
#[derive(Debug, Clone)]
pub struct KalshiClient {
    http: reqwest::Client,
    api_url: String,
}

/// One page of `/markets`.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketsResponse {
    /// Markets on this page.
    #[serde(default)]
    pub markets: Vec<KalshiMarket>,
    /// Cursor for the next page.
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Market entry returned by `/markets`.
#[derive(Debug, Clone, Deserialize)]
pub struct KalshiMarket {
    /// Market ticker.
    pub ticker: String,
    /// Market title.
    #[serde(default)]
    pub title: String,
    /// Expiration time (RFC 3339).
    pub expiration_time: Option<String>,
    /// Best yes ask in cents.
    pub yes_ask: Option<i64>,
    /// Best no ask in cents.
    pub no_ask: Option<i64>,
    /// Best yes bid in cents.
    pub yes_bid: Option<i64>,
    /// Best no bid in cents.
    pub no_bid: Option<i64>,
}

/// Response of `/markets/{ticker}/orderbook`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookResponse {
    /// Bid ladders per outcome.
    pub orderbook: RawOrderBook,
}

/// Bid ladders as `[price_cents, size]` pairs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOrderBook {
    /// Yes bids.
    #[serde(default)]
    pub yes: Option<Vec<[i64; 2]>>,
    /// No bids.
    #[serde(default)]
    pub no: Option<Vec<[i64; 2]>>,
}

impl KalshiClient {
    /// Create a new client from config.
    pub fn new(config: &Config) -> Result<Self, MarketError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self::with_http(http, &config.kalshi_api_url))
    }

    /// Create a client around an existing HTTP client.
    pub fn with_http(http: reqwest::Client, api_url: &str) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    fn failed(reason: impl Into<String>) -> MarketError {
        MarketError::FetchFailed {
            venue: Venue::Kalshi,
            reason: reason.into(),
        }
    }

    async fn get_markets(&self, query: &[(&str, String)]) -> Result<MarketsResponse, MarketError> {
        let url = format!("{}/markets", self.api_url);
        let response = self.http.get(&url).query(query).send().await?;

        if !response.status().is_success() {
            return Err(Self::failed(format!("HTTP {} from /markets", response.status())));
        }

        response
            .json()
            .await
            .map_err(|e| MarketError::ParseError(format!("Failed to parse markets: {}", e)))
    }

    /// List open markets; pagination stops when a cursor repeats.
    #[instrument(skip(self))]
    pub async fn fetch_active_markets(&self, limit: Option<usize>) -> Result<Vec<MarketRef>, MarketError> {
        let mut seen_cursors: HashSet<String> = HashSet::new();
        let mut cursor: Option<String> = None;
        let mut markets = Vec::new();

        loop {
            let mut query = vec![
                ("limit", REQUEST_LIMIT.to_string()),
                ("status", "open".to_string()),
            ];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let page = self.get_markets(&query).await?;
            let next = page.cursor.unwrap_or_default();
            if !seen_cursors.insert(next.clone()) {
                break;
            }

            for market in &page.markets {
                markets.push(market_ref(market));
                if limit.is_some_and(|n| markets.len() >= n) {
                    return Ok(markets);
                }
            }

            if next.is_empty() {
                break;
            }
            cursor = Some(next);
        }

        info!(count = markets.len(), "Listed open Kalshi markets");
        Ok(markets)
    }

    /// Fetch quotes for up to 100 tickers per request.
    #[instrument(skip(self, markets), fields(count = markets.len()))]
    pub async fn fetch_quotes(&self, markets: &[MarketRef]) -> Result<Vec<Quote>, MarketError> {
        let mut quotes = Vec::with_capacity(markets.len());

        for chunk in markets.chunks(REQUEST_LIMIT) {
            let tickers = chunk
                .iter()
                .map(|m| m.market_id.as_str())
                .collect::<Vec<_>>()
                .join(",");
            let query = [("limit", REQUEST_LIMIT.to_string()), ("tickers", tickers)];

            let page = self.get_markets(&query).await?;
            quotes.extend(page.markets.iter().filter_map(to_quote));
        }

        if quotes.len() < markets.len() {
            debug!(
                requested = markets.len(),
                priced = quotes.len(),
                "Some Kalshi markets returned no usable prices"
            );
        }

        Ok(quotes)
    }

    /// Fetch the order book and derive yes/no ask ladders from bids.
    #[instrument(skip(self, market), fields(ticker = %market.market_id))]
    pub async fn fetch_order_books(&self, market: &MarketRef) -> Result<LegBooks, MarketError> {
        let url = format!("{}/markets/{}/orderbook", self.api_url, market.market_id);
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Self::failed(format!(
                "HTTP {} fetching order book for {}",
                response.status(),
                market.market_id
            )));
        }

        let body: OrderBookResponse = response.json().await.map_err(|e| {
            MarketError::ParseError(format!("Failed to parse order book: {}", e))
        })?;

        Ok(convert_order_book(body.orderbook))
    }
}

fn market_ref(market: &KalshiMarket) -> MarketRef {
    let mut parsed = MarketRef::new(Venue::Kalshi, market.ticker.clone(), market.title.clone());
    if let Some(raw) = market.expiration_time.as_deref() {
        match OffsetDateTime::parse(raw, &Rfc3339) {
            Ok(ts) => parsed = parsed.with_resolution(ts),
            Err(e) => warn!(ticker = %market.ticker, raw, error = %e, "Unparseable expiration time"),
        }
    }
    parsed
}

fn cents(value: i64) -> Decimal {
    Decimal::from(value) / CENTS
}

/// Quote for a market with all four prices; `None` otherwise.
fn to_quote(market: &KalshiMarket) -> Option<Quote> {
    Some(Quote::new(
        market_ref(market),
        cents(market.yes_ask?),
        cents(market.no_ask?),
        cents(market.yes_bid?),
        cents(market.no_bid?),
    ))
}

/// A bid at `p` cents on one outcome is an ask at `100 - p` on the other.
fn convert_order_book(raw: RawOrderBook) -> LegBooks {
    let yes_bids = raw.yes.unwrap_or_default();
    let no_bids = raw.no.unwrap_or_default();

    let bids = |levels: &[[i64; 2]]| -> Vec<OrderLevel> {
        levels
            .iter()
            .map(|&[p, s]| OrderLevel::new(cents(p), Decimal::from(s)))
            .collect()
    };
    let complement = |levels: &[[i64; 2]]| -> Vec<OrderLevel> {
        levels
            .iter()
            .map(|&[p, s]| OrderLevel::new(cents(100 - p), Decimal::from(s)))
            .collect()
    };

    LegBooks::new(
        OrderBook::new(complement(&no_bids), bids(&yes_bids)),
        OrderBook::new(complement(&yes_bids), bids(&no_bids)),
    )
}
