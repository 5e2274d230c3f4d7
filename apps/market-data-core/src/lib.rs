#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Market Data Core - Streaming Distribution and Alerting
//!
//! Maintains a single WebSocket connection to the upstream price feed and
//! multiplexes updates to many in-process subscribers. Symbols the feed has
//! not priced yet are seeded from a poll-based fallback HTTP source; every
//! accepted update drives a one-shot alert engine whose firings land in a
//! notification store with user-configurable delivery preferences.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure state machines, no I/O
//!   - `routing`: Channel routing table with exact subscribe/unsubscribe
//!     transition tracking
//!   - `quote`: Per-symbol quote book with primary/fallback precedence
//!   - `alert`: Fire-once price alert evaluation
//!   - `notification`: Notification ledger, preferences, quiet hours
//!
//! - **Application**: Orchestration and port definitions
//!   - `ports`: Fallback price source and notification sink traits
//!   - `services`: Stream multiplexer and price aggregator
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `upstream`: WebSocket feed client with reconnect and heartbeat
//!   - `fallback`: HTTP fallback price source
//!   - `config`: Environment-based configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics` / `telemetry`: Prometheus and OpenTelemetry wiring
//!
//! # Data Flow
//!
//! ```text
//! Upstream WS ──► FeedClient ──► Multiplexer ──► per-symbol subscribers
//!                                    │                  │
//! Fallback HTTP ──► poller ──────► QuoteBook ◄── PriceAggregator
//!                                                       │
//!                                    AlertBook ──► NotificationStore
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core state machines with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::alert::{AlertBook, AlertCondition, PriceAlert};
pub use domain::notification::{
    DeliveryDecision, Notification, NotificationDraft, NotificationPreferences,
    NotificationPriority, NotificationStatus, NotificationStore, PreferencesUpdate, QuietHours,
};
pub use domain::quote::{PriceQuote, QuoteBook, QuoteSource};
pub use domain::routing::{ChannelRouter, RouteChange, RoutingStats, SubscriptionToken};

// Application services and ports
pub use application::ports::{FallbackError, FallbackSource, NotificationSink};
pub use application::services::{PriceAggregator, StreamMultiplexer, SubscriptionHandle};

// Infrastructure config
pub use infrastructure::config::{ConfigError, CoreConfig, FallbackSettings, UpstreamSettings};

// Upstream transport (for integration tests)
pub use infrastructure::upstream::{
    BackoffMode, ConnectionState, ConnectionStatus, FeedClient, FeedClientConfig, FeedEvent,
    FeedHandle, FeedMessage, OutboundFrame, ReconnectConfig,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
