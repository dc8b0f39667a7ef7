//! Metrics collection and exposition.
//!
//! # Metrics
//! - `sra_route_match_total` (counter): matcher outcomes by kind, result
//! - `sra_route_cache_total` (counter): behavior cache lookups by kind, outcome
//! - `sra_route_cache_clear_total` (counter): wholesale cache clears by cache
//! - `sra_requests_total` (counter): proxied requests by method, status
//! - `sra_request_duration_seconds` (histogram): request latency by method
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   exporter every call is a no-op
//! - Labels are static strings or small enums to bound cardinality

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub mod names {
    pub const ROUTE_MATCH_TOTAL: &str = "sra_route_match_total";
    pub const ROUTE_CACHE_TOTAL: &str = "sra_route_cache_total";
    pub const ROUTE_CACHE_CLEAR_TOTAL: &str = "sra_route_cache_clear_total";
    pub const REQUESTS_TOTAL: &str = "sra_requests_total";
    pub const REQUEST_DURATION_SECONDS: &str = "sra_request_duration_seconds";
}

/// Install the Prometheus exporter with its own scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_route_match(kind: &'static str, matched: bool) {
    let result = if matched { "match" } else { "no_match" };
    counter!(names::ROUTE_MATCH_TOTAL, "kind" => kind, "result" => result).increment(1);
}

pub fn record_cache_lookup(kind: &'static str, hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    counter!(names::ROUTE_CACHE_TOTAL, "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_cache_clear(cache: &'static str) {
    counter!(names::ROUTE_CACHE_CLEAR_TOTAL, "cache" => cache).increment(1);
}

/// Count a finished request and its latency since `start`.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        names::REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(names::REQUEST_DURATION_SECONDS, "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}
