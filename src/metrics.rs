//! Prometheus metrics for fetch latency and pipeline counters.
//!
//! This module provides metrics for:
//! - Quote batch and order book fetch latency per venue
//! - Scan cycle latency
//! - Opportunities built, refreshed and dropped
//! - Oracle requests and failures
//! - Strategy selections

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{debug, info};

use crate::market::Venue;

// === Metric Name Constants ===

/// Quote batch fetch latency metric name.
pub const METRIC_QUOTE_FETCH_LATENCY: &str = "quote_fetch_latency_ms";
/// Order book fetch latency metric name.
pub const METRIC_ORDERBOOK_FETCH_LATENCY: &str = "orderbook_fetch_latency_ms";
/// Scan cycle latency metric name.
pub const METRIC_SCAN_CYCLE_LATENCY: &str = "scan_cycle_latency_ms";
/// Opportunities built counter metric name.
pub const METRIC_OPPORTUNITIES_BUILT: &str = "opportunities_built_total";
/// Opportunities refreshed counter metric name.
pub const METRIC_OPPORTUNITIES_REFRESHED: &str = "opportunities_refreshed_total";
/// Opportunities dropped counter metric name.
pub const METRIC_OPPORTUNITIES_DROPPED: &str = "opportunities_dropped_total";
/// Failed quote batches counter metric name.
pub const METRIC_QUOTE_BATCHES_FAILED: &str = "quote_batches_failed_total";
/// Oracle requests counter metric name.
pub const METRIC_ORACLE_REQUESTS: &str = "oracle_requests_total";
/// Oracle failures counter metric name.
pub const METRIC_ORACLE_FAILURES: &str = "oracle_failures_total";
/// Strategy selections counter metric name.
pub const METRIC_STRATEGY_SELECTED: &str = "strategy_selected_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    // Latency histograms
    describe_histogram!(
        METRIC_QUOTE_FETCH_LATENCY,
        "Quote batch fetch latency in milliseconds"
    );
    describe_histogram!(
        METRIC_ORDERBOOK_FETCH_LATENCY,
        "Order book fetch latency in milliseconds"
    );
    describe_histogram!(
        METRIC_SCAN_CYCLE_LATENCY,
        "Full scan cycle latency in milliseconds"
    );

    // Counters
    describe_counter!(
        METRIC_OPPORTUNITIES_BUILT,
        "Total number of opportunities built from equivalence classes"
    );
    describe_counter!(
        METRIC_OPPORTUNITIES_REFRESHED,
        "Total number of opportunities refreshed with new quotes"
    );
    describe_counter!(
        METRIC_OPPORTUNITIES_DROPPED,
        "Total number of opportunities dropped for missing quotes"
    );
    describe_counter!(
        METRIC_QUOTE_BATCHES_FAILED,
        "Total number of quote batches that failed"
    );
    describe_counter!(
        METRIC_ORACLE_REQUESTS,
        "Total number of similarity and equivalence oracle requests"
    );
    describe_counter!(
        METRIC_ORACLE_FAILURES,
        "Total number of failed oracle requests"
    );
    describe_counter!(
        METRIC_STRATEGY_SELECTED,
        "Total number of candidates selected by the strategy"
    );

    debug!("Metrics initialized");
}

/// Install the Prometheus exporter on the given port.
pub fn install_exporter(port: u16) -> Result<(), String> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| e.to_string())?;
    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}

/// Record quote batch fetch latency.
pub fn record_quote_fetch_latency(start: Instant, venue: Venue) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_QUOTE_FETCH_LATENCY, "venue" => venue.to_string()).record(latency_ms);
}

/// Record order book fetch latency.
pub fn record_orderbook_fetch_latency(start: Instant, venue: Venue) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_ORDERBOOK_FETCH_LATENCY, "venue" => venue.to_string()).record(latency_ms);
}

/// Add to the opportunities built counter.
pub fn inc_opportunities_built(count: usize) {
    counter!(METRIC_OPPORTUNITIES_BUILT).increment(count as u64);
}

/// Add to the opportunities refreshed counter.
pub fn inc_opportunities_refreshed(count: usize) {
    counter!(METRIC_OPPORTUNITIES_REFRESHED).increment(count as u64);
}

/// Add to the opportunities dropped counter.
pub fn inc_opportunities_dropped(count: usize) {
    counter!(METRIC_OPPORTUNITIES_DROPPED).increment(count as u64);
}

/// Increment failed quote batches counter.
pub fn inc_quote_batches_failed(venue: Venue) {
    counter!(METRIC_QUOTE_BATCHES_FAILED, "venue" => venue.to_string()).increment(1);
}

/// Increment oracle requests counter.
pub fn inc_oracle_requests(oracle: &'static str) {
    counter!(METRIC_ORACLE_REQUESTS, "oracle" => oracle).increment(1);
}

/// Increment oracle failures counter.
pub fn inc_oracle_failures(oracle: &'static str) {
    counter!(METRIC_ORACLE_FAILURES, "oracle" => oracle).increment(1);
}

/// Add to the strategy selections counter.
pub fn inc_strategy_selected(count: usize) {
    counter!(METRIC_STRATEGY_SELECTED).increment(count as u64);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}

/// Create a latency timer for a scan cycle.
pub fn timer_scan_cycle() -> LatencyTimer {
    LatencyTimer::new(METRIC_SCAN_CYCLE_LATENCY)
}
