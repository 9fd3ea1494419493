//! HTTP API over the opportunity store.
//!
//! This module handles:
//! - Health and readiness probes
//! - Listing, lookup and deletion of opportunities
//! - On-demand refresh, order books and depth-aware top-N ranking

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
