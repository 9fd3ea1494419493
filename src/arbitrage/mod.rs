//! Arbitrage module for pricing cross-venue opportunities.
//!
//! This module handles:
//! - Absolute, annualized and depth-aware return calculations
//! - The opportunity entity and its cached returns
//! - Ranking opportunities by return

pub mod opportunity;
pub mod ranking;
pub mod returns;

pub use opportunity::Opportunity;
pub use ranking::{sort_by_optional_score, sort_opportunities, SortKey};
pub use returns::{
    absolute_return, annualize, annualized_return, size_aware_return, years_until, Annualized,
    HorizonPolicy, ReturnSettings, SECONDS_PER_YEAR,
};
