//! Prometheus metrics exporter
//!
//! HTTP endpoint for Prometheus scraping.

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use super::counters::METRICS;
use crate::config::MetricsConfig;

/// Initialize the Prometheus metrics exporter
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    describe_counter!("socksd_sessions_total", "Total client sessions accepted");
    describe_gauge!("socksd_sessions_active", "Currently active sessions");
    describe_counter!("socksd_sessions_rejected", "Sessions rejected at capacity");
    describe_counter!("socksd_auth_failures", "Failed authentication attempts");
    describe_counter!("socksd_connects_total", "Upstream TCP connections opened");
    describe_counter!("socksd_connect_failures", "Upstream TCP connect failures");
    describe_counter!("socksd_bytes_up", "Bytes relayed client to upstream");
    describe_counter!("socksd_bytes_down", "Bytes relayed upstream to client");
    describe_counter!("socksd_associations_total", "UDP associations opened");
    describe_counter!("socksd_datagrams_in", "Datagrams relayed upstream to client");
    describe_counter!("socksd_datagrams_out", "Datagrams relayed client to upstream");
    describe_counter!("socksd_protocol_errors", "Protocol violations observed");
    describe_counter!("socksd_timeouts_total", "Relay idle and connect timeouts");

    PrometheusBuilder::new()
        .with_http_listener(config.bind_addr)
        .install()?;

    tokio::spawn(sync_metrics_task());

    Ok(())
}

/// Background task that periodically syncs the atomic counters to the
/// metrics crate.
async fn sync_metrics_task() {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
    let mut last = METRICS.snapshot();

    loop {
        interval.tick().await;
        let snapshot = METRICS.snapshot();

        emit_delta("socksd_sessions_total", snapshot.sessions_total, last.sessions_total);
        gauge!("socksd_sessions_active").set(snapshot.sessions_active as f64);
        emit_delta(
            "socksd_sessions_rejected",
            snapshot.sessions_rejected,
            last.sessions_rejected,
        );
        emit_delta("socksd_auth_failures", snapshot.auth_failures, last.auth_failures);
        emit_delta("socksd_connects_total", snapshot.connects_total, last.connects_total);
        emit_delta(
            "socksd_connect_failures",
            snapshot.connect_failures,
            last.connect_failures,
        );
        emit_delta("socksd_bytes_up", snapshot.bytes_up, last.bytes_up);
        emit_delta("socksd_bytes_down", snapshot.bytes_down, last.bytes_down);
        emit_delta(
            "socksd_associations_total",
            snapshot.associations_total,
            last.associations_total,
        );
        emit_delta("socksd_datagrams_in", snapshot.datagrams_in, last.datagrams_in);
        emit_delta("socksd_datagrams_out", snapshot.datagrams_out, last.datagrams_out);
        emit_delta(
            "socksd_protocol_errors",
            snapshot.protocol_errors,
            last.protocol_errors,
        );
        emit_delta("socksd_timeouts_total", snapshot.timeouts_total, last.timeouts_total);

        last = snapshot;
    }
}

fn emit_delta(name: &'static str, current: u64, previous: u64) {
    let delta = current.saturating_sub(previous);
    if delta > 0 {
        counter!(name).increment(delta);
    }
}
