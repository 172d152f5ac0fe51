//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_upstream_messages_total` (counter): frames received from the feed
//! - `relay_broadcast_deliveries_total` (counter): frames queued to subscribers
//! - `relay_broadcast_failures_total` (counter): subscribers dropped on send
//! - `relay_subscribers` (gauge): current subscriber count
//! - `relay_upstream_connected` (gauge): 1=connected, 0=not
//! - `relay_upstream_reconnects_total` (counter): reconnects scheduled
//!
//! Calls are no-ops until [`init_metrics`] installs the Prometheus recorder.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_upstream_message() {
    ::metrics::counter!("relay_upstream_messages_total").increment(1);
}

pub fn record_broadcast(sent: usize, failed: usize) {
    ::metrics::counter!("relay_broadcast_deliveries_total").increment(sent as u64);
    if failed > 0 {
        ::metrics::counter!("relay_broadcast_failures_total").increment(failed as u64);
    }
}

pub fn record_subscribers(count: usize) {
    ::metrics::gauge!("relay_subscribers").set(count as f64);
}

pub fn record_upstream_connected(connected: bool) {
    ::metrics::gauge!("relay_upstream_connected").set(if connected { 1.0 } else { 0.0 });
}

pub fn record_reconnect_scheduled() {
    ::metrics::counter!("relay_upstream_reconnects_total").increment(1);
}
