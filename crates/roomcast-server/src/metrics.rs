//! Metrics collection and export for Roomcast.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use roomcast_core::{HubHandle, HubStats};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "roomcast_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "roomcast_connections_active";
    pub const ROOMS_ACTIVE: &str = "roomcast_rooms_active";
    pub const BROADCASTS_TOTAL: &str = "roomcast_broadcasts_total";
    pub const EVICTIONS_TOTAL: &str = "roomcast_evictions_total";
    pub const HUB_PENDING: &str = "roomcast_hub_pending";
    pub const MESSAGES_POSTED_TOTAL: &str = "roomcast_messages_posted_total";
    pub const ERRORS_TOTAL: &str = "roomcast_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of WebSocket connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open WebSocket connections"
    );
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Rooms with at least one member");
    metrics::describe_counter!(names::BROADCASTS_TOTAL, "Broadcasts processed by the hub");
    metrics::describe_counter!(
        names::EVICTIONS_TOTAL,
        "Connections evicted for a full outbound queue"
    );
    metrics::describe_gauge!(
        names::HUB_PENDING,
        "Requests queued for the hub control loop"
    );
    metrics::describe_counter!(
        names::MESSAGES_POSTED_TOTAL,
        "Messages accepted by the HTTP API"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a message accepted by the API.
pub fn record_message_posted() {
    counter!(names::MESSAGES_POSTED_TOTAL).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Publish a hub statistics snapshot.
pub fn record_hub_stats(stats: &HubStats) {
    gauge!(names::ROOMS_ACTIVE).set(stats.room_count as f64);
    counter!(names::BROADCASTS_TOTAL).absolute(stats.broadcasts);
    counter!(names::EVICTIONS_TOTAL).absolute(stats.evictions);
    gauge!(names::HUB_PENDING).set(stats.pending as f64);
}

/// Periodically publish hub statistics until the hub stops.
pub fn spawn_stats_reporter(hub: HubHandle, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        while hub.is_running() {
            ticker.tick().await;
            record_hub_stats(&hub.stats());
        }
    })
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
