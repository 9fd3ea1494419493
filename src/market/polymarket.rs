//! Polymarket CLOB API client.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use super::types::{MarketRef, Quote, Venue};
use crate::config::Config;
use crate::error::MarketError;
use crate::orderbook::{LegBooks, OrderBook, OrderLevel};

/// Cursor value the CLOB returns after the last page.
const END_CURSOR: &str = "LTE=";

/// Polymarket CLOB API client.
#[derive(Debug, Clone)]
pub struct PolymarketClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Base URL for CLOB API.
    clob_url: String,
}

/// Order book response from API.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookResponse {
    /// Bid levels.
    pub bids: Option<Vec<RawLevel>>,
    /// Ask levels.
    pub asks: Option<Vec<RawLevel>>,
}

/// Single price level as sent by the CLOB.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawLevel {
    /// Price at this level.
    pub price: String,
    /// Size available at this level.
    pub size: String,
}

/// One page of the market listing.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketsPage {
    /// Markets on this page.
    #[serde(default)]
    pub data: Vec<ClobMarket>,
    /// Cursor for the next page.
    pub next_cursor: Option<String>,
}

/// Market entry in the listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ClobMarket {
    /// Condition id.
    #[serde(default)]
    pub condition_id: String,
    /// Market question.
    #[serde(default)]
    pub question: String,
    /// End date (ISO format).
    pub end_date_iso: Option<String>,
    /// Outcome tokens.
    #[serde(default)]
    pub tokens: Vec<ClobToken>,
}

/// Outcome token of a market.
#[derive(Debug, Clone, Deserialize)]
pub struct ClobToken {
    /// Token id.
    pub token_id: String,
    /// Outcome label ("Yes"/"No").
    pub outcome: String,
}

/// Request parameter for the batched price endpoint.
#[derive(Debug, Clone, Serialize)]
struct PriceParam<'a> {
    token_id: &'a str,
    side: &'static str,
}

impl PolymarketClient {
    /// Create a new Polymarket client from config.
    pub fn new(config: &Config) -> Result<Self, MarketError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .connect_timeout(Duration::from_secs(5))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self::with_http(http, &config.polymarket_clob_url))
    }

    /// Create a client around an existing HTTP client.
    pub fn with_http(http: reqwest::Client, clob_url: &str) -> Self {
        Self {
            http,
            clob_url: clob_url.trim_end_matches('/').to_string(),
        }
    }

    /// Get the CLOB base URL.
    pub fn clob_url(&self) -> &str {
        &self.clob_url
    }

    fn failed(reason: impl Into<String>) -> MarketError {
        MarketError::FetchFailed {
            venue: Venue::Polymarket,
            reason: reason.into(),
        }
    }

    /// List active binary markets, following the cursor until exhausted.
    #[instrument(skip(self))]
    pub async fn fetch_active_markets(&self, limit: Option<usize>) -> Result<Vec<MarketRef>, MarketError> {
        let url = format!("{}/markets", self.clob_url);
        let now = OffsetDateTime::now_utc();
        let mut cursor = String::new();
        let mut markets = Vec::new();

        loop {
            let response = self
                .http
                .get(&url)
                .query(&[("next_cursor", cursor.as_str())])
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(Self::failed(format!("HTTP {} listing markets", response.status())));
            }

            let page: MarketsPage = response.json().await.map_err(|e| {
                MarketError::ParseError(format!("Failed to parse market page: {}", e))
            })?;

            if page.data.is_empty() {
                break;
            }

            for market in &page.data {
                if let Some(parsed) = active_market(market, now) {
                    markets.push(parsed);
                    if limit.is_some_and(|n| markets.len() >= n) {
                        return Ok(markets);
                    }
                }
            }

            match page.next_cursor {
                Some(next) if !next.is_empty() && next != END_CURSOR => cursor = next,
                _ => break,
            }
        }

        info!(count = markets.len(), "Listed active Polymarket markets");
        Ok(markets)
    }

    /// Fetch best bid/ask for the yes and no tokens of each market.
    ///
    /// Markets without tokens or with any unparseable price are omitted.
    #[instrument(skip(self, markets), fields(count = markets.len()))]
    pub async fn fetch_quotes(&self, markets: &[MarketRef]) -> Result<Vec<Quote>, MarketError> {
        let priced: Vec<(&MarketRef, &str, &str)> = markets
            .iter()
            .filter_map(|m| Some((m, m.yes_token_id.as_deref()?, m.no_token_id.as_deref()?)))
            .collect();

        if priced.is_empty() {
            return Ok(Vec::new());
        }

        let params: Vec<PriceParam<'_>> = priced
            .iter()
            .flat_map(|&(_, yes, no)| [yes, no])
            .flat_map(|token_id| {
                [
                    PriceParam { token_id, side: "BUY" },
                    PriceParam { token_id, side: "SELL" },
                ]
            })
            .collect();

        let url = format!("{}/prices", self.clob_url);
        let response = self.http.post(&url).json(&params).send().await?;

        if !response.status().is_success() {
            return Err(Self::failed(format!("HTTP {} fetching prices", response.status())));
        }

        let prices: HashMap<String, HashMap<String, Value>> = response.json().await.map_err(|e| {
            MarketError::ParseError(format!("Failed to parse prices: {}", e))
        })?;

        let quotes: Vec<Quote> = priced
            .into_iter()
            .filter_map(|(market, yes, no)| {
                let (yes_bid, yes_ask) = token_prices(&prices, yes)?;
                let (no_bid, no_ask) = token_prices(&prices, no)?;
                Some(Quote::new(market.clone(), yes_ask, no_ask, yes_bid, no_bid))
            })
            .collect();

        if quotes.len() < markets.len() {
            debug!(
                requested = markets.len(),
                priced = quotes.len(),
                "Some Polymarket markets returned no usable prices"
            );
        }

        Ok(quotes)
    }

    /// Get yes and no order books for a market.
    #[instrument(skip(self, market), fields(market_id = %market.market_id))]
    pub async fn fetch_order_books(&self, market: &MarketRef) -> Result<LegBooks, MarketError> {
        let missing = |what| MarketError::MissingData {
            venue: Venue::Polymarket,
            market_id: market.market_id.clone(),
            what,
        };
        let yes_token = market.yes_token_id.as_deref().ok_or_else(|| missing("yes token"))?;
        let no_token = market.no_token_id.as_deref().ok_or_else(|| missing("no token"))?;

        let yes = self.fetch_book(yes_token).await?;
        let no = self.fetch_book(no_token).await?;
        Ok(LegBooks::new(yes, no))
    }

    async fn fetch_book(&self, token_id: &str) -> Result<OrderBook, MarketError> {
        let url = format!("{}/book", self.clob_url);

        let response = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failed(format!(
                "HTTP {} fetching book for {}",
                response.status(),
                token_id
            )));
        }

        let book: OrderBookResponse = response.json().await.map_err(|e| {
            MarketError::ParseError(format!("Failed to parse order book: {}", e))
        })?;

        Ok(convert_order_book(book))
    }
}

/// Convert an active, well-formed listing entry to a market reference.
fn active_market(market: &ClobMarket, now: OffsetDateTime) -> Option<MarketRef> {
    if market.condition_id.is_empty() {
        return None;
    }

    let end_date = market.end_date_iso.as_deref()?;
    let resolves_at = match OffsetDateTime::parse(end_date, &Rfc3339) {
        Ok(ts) => ts,
        Err(e) => {
            warn!(condition_id = %market.condition_id, end_date, error = %e, "Unparseable end date");
            return None;
        }
    };
    if resolves_at <= now {
        return None;
    }

    let token = |label: &str| {
        market
            .tokens
            .iter()
            .find(|t| t.outcome.eq_ignore_ascii_case(label))
            .map(|t| t.token_id.clone())
    };

    Some(
        MarketRef::new(Venue::Polymarket, market.condition_id.clone(), market.question.clone())
            .with_tokens(token("yes")?, token("no")?)
            .with_resolution(resolves_at),
    )
}

/// `(bid, ask)` for a token; the SELL quote is the ask.
fn token_prices(
    prices: &HashMap<String, HashMap<String, Value>>,
    token_id: &str,
) -> Option<(Decimal, Decimal)> {
    let sides = prices.get(token_id)?;
    let bid = parse_price(sides.get("BUY")?)?;
    let ask = parse_price(sides.get("SELL")?)?;
    Some((bid, ask))
}

/// Prices arrive either as JSON strings or numbers.
fn parse_price(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

/// Convert API response to an order book.
fn convert_order_book(response: OrderBookResponse) -> OrderBook {
    let parse_levels = |levels: Option<Vec<RawLevel>>| -> Vec<OrderLevel> {
        levels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|level| {
                let price: Decimal = level.price.parse().ok()?;
                let size: Decimal = level.size.parse().ok()?;
                Some(OrderLevel { price, size })
            })
            .collect()
    };

    OrderBook::new(parse_levels(response.asks), parse_levels(response.bids))
}
