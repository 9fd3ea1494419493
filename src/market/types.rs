//! Market-related types shared across venues.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use time::OffsetDateTime;

/// Trading venue tag.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Venue {
    /// Kalshi exchange.
    Kalshi,
    /// Polymarket CLOB.
    Polymarket,
}

impl Venue {
    /// Maximum number of markets per quote request.
    pub fn max_batch_size(&self) -> usize {
        match self {
            Venue::Kalshi => 100,
            // Four price params per market under a 500-param request cap.
            Venue::Polymarket => 125,
        }
    }
}

/// Identity of a listed binary market, without prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketRef {
    /// Venue the market trades on.
    pub venue: Venue,
    /// Venue-specific market id (ticker or condition id).
    pub market_id: String,
    /// Question text as listed by the venue.
    pub question: String,
    /// Yes outcome token, for venues that trade outcomes as tokens.
    #[serde(default)]
    pub yes_token_id: Option<String>,
    /// No outcome token, for venues that trade outcomes as tokens.
    #[serde(default)]
    pub no_token_id: Option<String>,
    /// When the market resolves.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub resolves_at: Option<OffsetDateTime>,
}

impl MarketRef {
    /// Create a market reference without outcome tokens.
    pub fn new(venue: Venue, market_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            venue,
            market_id: market_id.into(),
            question: question.into(),
            yes_token_id: None,
            no_token_id: None,
            resolves_at: None,
        }
    }

    /// Set the outcome tokens.
    pub fn with_tokens(mut self, yes: impl Into<String>, no: impl Into<String>) -> Self {
        self.yes_token_id = Some(yes.into());
        self.no_token_id = Some(no.into());
        self
    }

    /// Set the resolution time.
    pub fn with_resolution(mut self, resolves_at: OffsetDateTime) -> Self {
        self.resolves_at = Some(resolves_at);
        self
    }

    /// Lookup key of this market.
    pub fn key(&self) -> MarketKey {
        MarketKey {
            venue: self.venue,
            market_id: self.market_id.clone(),
        }
    }
}

/// Venue-qualified market id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarketKey {
    /// Venue.
    pub venue: Venue,
    /// Market id on that venue.
    pub market_id: String,
}

impl std::fmt::Display for MarketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.venue, self.market_id)
    }
}

/// Immutable price snapshot of one market.
///
/// Replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Market identity.
    #[serde(flatten)]
    pub market: MarketRef,
    /// Best ask for the yes outcome.
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub yes_ask: Option<Decimal>,
    /// Best ask for the no outcome.
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub no_ask: Option<Decimal>,
    /// Best bid for the yes outcome.
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub yes_bid: Option<Decimal>,
    /// Best bid for the no outcome.
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub no_bid: Option<Decimal>,
}

impl Quote {
    /// Create a fully priced quote.
    pub fn new(
        market: MarketRef,
        yes_ask: Decimal,
        no_ask: Decimal,
        yes_bid: Decimal,
        no_bid: Decimal,
    ) -> Self {
        Self {
            market,
            yes_ask: Some(yes_ask),
            no_ask: Some(no_ask),
            yes_bid: Some(yes_bid),
            no_bid: Some(no_bid),
        }
    }

    /// Venue of the quoted market.
    pub fn venue(&self) -> Venue {
        self.market.venue
    }

    /// Id of the quoted market.
    pub fn market_id(&self) -> &str {
        &self.market.market_id
    }

    /// Question text of the quoted market.
    pub fn question(&self) -> &str {
        &self.market.question
    }

    /// Resolution time of the quoted market.
    pub fn resolves_at(&self) -> Option<OffsetDateTime> {
        self.market.resolves_at
    }

    /// Lookup key of the quoted market.
    pub fn key(&self) -> MarketKey {
        self.market.key()
    }

    /// Check that all four prices are present.
    pub fn is_fully_priced(&self) -> bool {
        self.yes_ask.is_some() && self.no_ask.is_some() && self.yes_bid.is_some() && self.no_bid.is_some()
    }
}
