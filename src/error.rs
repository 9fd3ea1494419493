//! Unified error types for the arbitrage scanner.

use thiserror::Error;
use uuid::Uuid;

use crate::market::Venue;
use crate::orderbook::BookSide;

/// Unified error type for the arbitrage scanner.
#[derive(Error, Debug)]
pub enum ScannerError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Venue data error.
    #[error("market error: {0}")]
    Market(#[from] MarketError),

    /// Return calculation error.
    #[error("return error: {0}")]
    Return(#[from] ReturnError),

    /// Similarity or equivalence oracle error.
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// Opportunity store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Venue data fetch errors.
#[derive(Error, Debug)]
pub enum MarketError {
    /// Request to a venue failed or returned a non-success status.
    #[error("failed to fetch from {venue}: {reason}")]
    FetchFailed {
        /// Venue that failed.
        venue: Venue,
        /// Reason for failure.
        reason: String,
    },

    /// Venue payload could not be interpreted.
    #[error("failed to parse market data: {0}")]
    ParseError(String),

    /// No client registered for the venue.
    #[error("no client registered for venue {0}")]
    UnknownVenue(Venue),

    /// A required market or token id is absent.
    #[error("missing data for {venue} market {market_id}: {what}")]
    MissingData {
        /// Venue of the market.
        venue: Venue,
        /// Market identifier.
        market_id: String,
        /// What was missing.
        what: &'static str,
    },

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Order book access errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBookError {
    /// The requested side has no levels.
    #[error("{0} side of the book is empty")]
    EmptySide(BookSide),
}

/// Return calculation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReturnError {
    /// A price needed for the calculation is absent.
    #[error("missing price: {0}")]
    MissingData(&'static str),

    /// The combined investment is zero.
    #[error("investment is zero")]
    ZeroInvestment,

    /// The time to resolution is not positive.
    #[error("non-positive horizon: {years} years to resolution")]
    NonPositiveHorizon {
        /// Horizon in years.
        years: f64,
    },

    /// One of the legs has no resolution time.
    #[error("resolution time unavailable")]
    MissingResolutionTime,
}

/// Similarity and equivalence oracle errors.
#[derive(Error, Debug)]
pub enum OracleError {
    /// The oracle could not be reached or refused the request.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    /// The oracle replied with something that cannot be used.
    #[error("malformed oracle response: {0}")]
    Malformed(String),

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Opportunity store and persistence errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No opportunity with the given id.
    #[error("opportunity {0} not found")]
    NotFound(Uuid),

    /// File access failed.
    #[error("persistence io error at {path}: {source}")]
    Io {
        /// File that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Stored JSON could not be (de)serialized.
    #[error("persistence json error at {path}: {source}")]
    Json {
        /// File that failed.
        path: String,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, ScannerError>;
