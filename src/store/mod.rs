//! Opportunity store and persistence.
//!
//! This module handles:
//! - Building opportunities from equivalence classes
//! - Refreshing legs with batched quotes, dropping stale pairs
//! - Lookup, deletion and sorted listing
//! - JSON files for markets, classes and opportunities

pub mod opportunities;
pub mod persistence;

pub use opportunities::{
    build_opportunities, fetch_leg_books, fetch_quotes_by_venue, refresh_opportunities,
    OpportunityStore, QuoteMap, RefreshReport,
};
pub use persistence::JsonRepository;
