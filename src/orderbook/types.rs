//! Order book types and data structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::OrderBookError;

/// Side of a price ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BookSide {
    /// Offers to sell, best (lowest) first.
    Ask,
    /// Offers to buy, best (highest) first.
    Bid,
}

/// Single price level in an order book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderLevel {
    /// Price at this level, as a probability.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Total size available at this price.
    #[serde(with = "rust_decimal::serde::float")]
    pub size: Decimal,
}

impl OrderLevel {
    /// Create a new price level.
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Raw, unordered ladder as received from a venue or a stored record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBookData {
    /// Ask levels in any order.
    #[serde(default)]
    pub asks: Vec<OrderLevel>,
    /// Bid levels in any order.
    #[serde(default)]
    pub bids: Vec<OrderLevel>,
}

/// Two-sided price ladder for one outcome token.
///
/// Asks are held ascending by price and bids descending. Levels with a
/// non-positive size are dropped at construction and the book is never
/// reordered afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "OrderBookData")]
pub struct OrderBook {
    asks: Vec<OrderLevel>,
    bids: Vec<OrderLevel>,
}

impl From<OrderBookData> for OrderBook {
    fn from(data: OrderBookData) -> Self {
        Self::new(data.asks, data.bids)
    }
}

impl OrderBook {
    /// Build a book from raw levels, establishing side ordering.
    pub fn new(asks: Vec<OrderLevel>, bids: Vec<OrderLevel>) -> Self {
        let keep = |level: &OrderLevel| level.size > Decimal::ZERO;

        let mut asks: Vec<OrderLevel> = asks.into_iter().filter(keep).collect();
        let mut bids: Vec<OrderLevel> = bids.into_iter().filter(keep).collect();

        // Sort asks ascending by price
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        // Sort bids descending by price
        bids.sort_by(|a, b| b.price.cmp(&a.price));

        Self { asks, bids }
    }

    /// A book with no liquidity on either side.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Ask levels, best first.
    pub fn asks(&self) -> &[OrderLevel] {
        &self.asks
    }

    /// Bid levels, best first.
    pub fn bids(&self) -> &[OrderLevel] {
        &self.bids
    }

    /// Levels of the given side, best first.
    pub fn levels(&self, side: BookSide) -> &[OrderLevel] {
        match side {
            BookSide::Ask => &self.asks,
            BookSide::Bid => &self.bids,
        }
    }

    /// Get the best ask level.
    pub fn best_ask(&self) -> Result<OrderLevel, OrderBookError> {
        self.asks
            .first()
            .copied()
            .ok_or(OrderBookError::EmptySide(BookSide::Ask))
    }

    /// Get the best bid level.
    pub fn best_bid(&self) -> Result<OrderLevel, OrderBookError> {
        self.bids
            .first()
            .copied()
            .ok_or(OrderBookError::EmptySide(BookSide::Bid))
    }

    /// Get total size resting on one side.
    pub fn total_size(&self, side: BookSide) -> Decimal {
        self.levels(side).iter().map(|l| l.size).sum()
    }

    /// Check whether either side has liquidity.
    pub fn is_empty(&self) -> bool {
        self.asks.is_empty() && self.bids.is_empty()
    }

    /// Size-weighted price of filling `quantity` against one side.
    ///
    /// Returns `None` when the side cannot absorb the full quantity.
    pub fn effective_price(&self, side: BookSide, quantity: Decimal) -> Option<Decimal> {
        super::aggregator::effective_price(self.levels(side), quantity)
    }
}

/// Yes and no books for a single market.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegBooks {
    /// Book for the yes outcome.
    pub yes: OrderBook,
    /// Book for the no outcome.
    pub no: OrderBook,
}

impl LegBooks {
    /// Pair a yes book with a no book.
    pub fn new(yes: OrderBook, no: OrderBook) -> Self {
        Self { yes, no }
    }
}
