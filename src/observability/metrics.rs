//! Metrics collection and exposition.
//!
//! # Metrics
//! - `georeplica_replication_total` (counter): pushes by target, status
//! - `georeplica_replication_latency_ms` (histogram): push latency by target
//! - `georeplica_replication_lag_ms` (gauge): aggregated lag by source, target
//! - `georeplica_cache_lookups_total` (counter): lookups by tier, result
//! - `georeplica_cache_invalidations_total` (counter)
//! - `georeplica_heartbeats_total` (counter)
//! - `georeplica_replication_queue_depth` (gauge)

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_replication(target: &str, status: &'static str, latency_ms: u64) {
    ::metrics::counter!(
        "georeplica_replication_total",
        "target" => target.to_string(),
        "status" => status
    )
    .increment(1);
    ::metrics::histogram!(
        "georeplica_replication_latency_ms",
        "target" => target.to_string()
    )
    .record(latency_ms as f64);
}

pub fn record_replication_lag(source: &str, target: &str, lag_ms: f64) {
    ::metrics::gauge!(
        "georeplica_replication_lag_ms",
        "source" => source.to_string(),
        "target" => target.to_string()
    )
    .set(lag_ms);
}

pub fn record_queue_depth(depth: usize) {
    ::metrics::gauge!("georeplica_replication_queue_depth").set(depth as f64);
}

pub fn record_cache_lookup(tier: &'static str, result: &'static str) {
    ::metrics::counter!(
        "georeplica_cache_lookups_total",
        "tier" => tier,
        "result" => result
    )
    .increment(1);
}

pub fn record_cache_invalidation(keys: u64) {
    ::metrics::counter!("georeplica_cache_invalidations_total").increment(keys);
}

pub fn record_heartbeat(region: &str) {
    ::metrics::counter!("georeplica_heartbeats_total", "region" => region.to_string()).increment(1);
}
