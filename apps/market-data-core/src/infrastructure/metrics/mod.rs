//! Prometheus Metrics Module
//!
//! Counters and gauges for the market-data core, rendered at `/metrics` on
//! the health server port.

use std::sync::OnceLock;

use metrics::{describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::routing::RoutingStats;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics initialization error.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The recorder could not be installed.
    #[error("failed to install Prometheus recorder: {0}")]
    InstallFailed(String),
}

/// Initialize the Prometheus metrics recorder.
///
/// Idempotent: later calls return the already-installed handle.
///
/// # Errors
///
/// Returns [`MetricsError::InstallFailed`] when another recorder is already
/// registered with the `metrics` facade.
pub fn init_metrics() -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::InstallFailed(e.to_string()))?;

    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn register_metrics() {
    // Transport counters
    describe_counter!(
        "market_data_frames_received_total",
        "Total decoded frames received from the upstream feed"
    );
    describe_counter!(
        "market_data_frames_dropped_total",
        "Total frames dropped because no channel was routed"
    );
    describe_counter!(
        "market_data_reconnects_total",
        "Total upstream reconnection attempts"
    );

    // Fallback counters
    describe_counter!(
        "market_data_fallback_polls_total",
        "Total fallback price polls issued"
    );
    describe_counter!(
        "market_data_fallback_failures_total",
        "Total failed fallback price polls"
    );

    // Alerting counters
    describe_counter!("market_data_alerts_fired_total", "Total alerts fired");
    describe_counter!(
        "market_data_notifications_created_total",
        "Total notifications recorded"
    );
    describe_counter!(
        "market_data_notifications_suppressed_total",
        "Total notifications recorded with all delivery side effects suppressed"
    );

    // Routing gauges
    describe_gauge!(
        "market_data_active_channels",
        "Channels with at least one subscriber"
    );
    describe_gauge!(
        "market_data_subscribers",
        "Total subscribers across all channels"
    );
}

/// Publish the current routing statistics.
pub fn record_routing_stats(stats: &RoutingStats) {
    #[allow(clippy::cast_precision_loss)]
    {
        gauge!("market_data_active_channels").set(stats.channel_count as f64);
        gauge!("market_data_subscribers").set(stats.subscriber_count as f64);
    }
}
