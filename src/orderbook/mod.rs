//! Order book module for depth-aware pricing.
//!
//! This module handles:
//! - Order book types with ordering fixed at construction
//! - Fill price calculations by walking a side of the book

pub mod aggregator;
pub mod types;

pub use aggregator::effective_price;
pub use types::{BookSide, LegBooks, OrderBook, OrderBookData, OrderLevel};
