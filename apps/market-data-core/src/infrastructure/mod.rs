//! Infrastructure layer - Adapters for the outside world.

/// Environment-based configuration.
pub mod config;
/// Fallback HTTP price source.
pub mod fallback;
/// Health check HTTP endpoint.
pub mod health;
/// Prometheus metrics.
pub mod metrics;
/// OpenTelemetry tracing.
pub mod telemetry;
/// Upstream WebSocket feed transport.
pub mod upstream;
