//! Metrics collection and exposition.
//!
//! # Metrics
//! - `appconfig_fetch_total` (counter): polls by outcome
//!   (updated, unchanged, transport, timeout, upstream, malformed, panic)
//! - `appconfig_fetch_duration_seconds` (histogram): agent round-trip latency
//! - `appconfig_snapshot_revision` (gauge): revision of the published snapshot
//! - `appconfig_gate_decisions_total` (counter): gated requests by key and decision
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op without a recorder
//! - Prometheus exporter is opt-in via `observability.metrics_enabled`

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus recorder"),
    }
}

pub fn record_fetch(outcome: &'static str, elapsed: Option<Duration>) {
    ::metrics::counter!("appconfig_fetch_total", "outcome" => outcome).increment(1);
    if let Some(elapsed) = elapsed {
        ::metrics::histogram!("appconfig_fetch_duration_seconds").record(elapsed.as_secs_f64());
    }
}

pub fn record_snapshot_revision(revision: u64) {
    ::metrics::gauge!("appconfig_snapshot_revision").set(revision as f64);
}

pub fn record_gate_decision(key: &str, allowed: bool) {
    let decision = if allowed { "allowed" } else { "denied" };
    ::metrics::counter!(
        "appconfig_gate_decisions_total",
        "key" => key.to_string(),
        "decision" => decision
    )
    .increment(1);
}
