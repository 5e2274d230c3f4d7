//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, connection status reporting, and
//! Prometheus metrics. Used by container orchestrators and monitoring.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (upstream connected)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::StreamMultiplexer;
use crate::domain::notification::NotificationStore;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::upstream::{ConnectionState, ConnectionStatus, FeedHandle};

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Core version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream connection snapshot.
    pub connection: ConnectionState,
    /// Frames received since startup.
    pub messages_received: u64,
    /// Routing statistics.
    pub routing: RoutingStatus,
    /// Notification statistics.
    pub notifications: NotificationStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Upstream connected, data flowing.
    Healthy,
    /// Upstream down but reconnecting; serving held or fallback data.
    Degraded,
    /// Upstream down with no recovery in progress.
    Unhealthy,
}

/// Routing statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingStatus {
    /// Channels with at least one subscriber.
    pub channels: usize,
    /// Total subscribers across all channels.
    pub subscribers: usize,
}

/// Notification statistics.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationStatus {
    /// Unread notifications.
    pub unread: usize,
    /// Total notifications held.
    pub total: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    feed: FeedHandle,
    multiplexer: Arc<StreamMultiplexer>,
    notifications: Arc<NotificationStore>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        feed: FeedHandle,
        multiplexer: Arc<StreamMultiplexer>,
        notifications: Arc<NotificationStore>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            feed,
            multiplexer,
            notifications,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.feed.connection_state().is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    // Refresh the routing gauges at scrape time.
    crate::infrastructure::metrics::record_routing_stats(&state.multiplexer.stats());

    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let connection = state.feed.connection_state();
    let routing = state.multiplexer.stats();

    HealthResponse {
        status: determine_health_status(&connection),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        messages_received: state.multiplexer.frames_received(),
        routing: RoutingStatus {
            channels: routing.channel_count,
            subscribers: routing.subscriber_count,
        },
        notifications: NotificationStatus {
            unread: state.notifications.unread_count(),
            total: state.notifications.len(),
        },
        connection,
    }
}

fn determine_health_status(connection: &ConnectionState) -> HealthStatus {
    match connection.status {
        ConnectionStatus::Connected => HealthStatus::Healthy,
        ConnectionStatus::Connecting | ConnectionStatus::Error => HealthStatus::Degraded,
        ConnectionStatus::Disconnected => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
