// Metrics module for observability
// Registers metric descriptions and the optional Prometheus scrape endpoint

use std::net::SocketAddr;

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    // Channel metrics
    describe_counter!(
        "tarpon_channel_messages_total",
        "Total number of inbound channel messages"
    );
    describe_counter!(
        "tarpon_unknown_headers_total",
        "Total number of messages dropped for an unsupported header byte"
    );
    describe_counter!(
        "tarpon_channels_closed_total",
        "Total number of channels torn down"
    );
    describe_gauge!("tarpon_connections_active", "Currently open connections");

    // Transaction metrics
    describe_counter!(
        "tarpon_tx_operations_total",
        "Total number of transaction control operations handled"
    );

    // Recovery metrics
    describe_gauge!(
        "tarpon_recovery_resources",
        "Recoverable resources seen by the last recovery scan"
    );
}

/// Expose metrics over a Prometheus scrape endpoint.
pub fn install_prometheus(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus exporter: {e}"))?;
    Ok(())
}
