//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_requests_total` (counter): dispatched requests by outcome, method
//! - `dispatch_duration_seconds` (histogram): time spent in the pipeline by outcome
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so the dispatcher
//!   can record unconditionally
//! - Method labels are bounded: extension methods are reported as "OTHER"

use std::net::SocketAddr;
use std::time::Instant;

use axum::http::Method;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::dispatch::Outcome;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn method_label(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::PATCH => "PATCH",
        Method::DELETE => "DELETE",
        Method::HEAD => "HEAD",
        Method::OPTIONS => "OPTIONS",
        Method::CONNECT => "CONNECT",
        Method::TRACE => "TRACE",
        _ => "OTHER",
    }
}

/// Record one dispatched request.
pub fn record_dispatch(method: &Method, outcome: Outcome, start: Instant) {
    let outcome = outcome.as_str();
    metrics::counter!(
        "dispatch_requests_total",
        "outcome" => outcome,
        "method" => method_label(method)
    )
    .increment(1);
    metrics::histogram!("dispatch_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}
