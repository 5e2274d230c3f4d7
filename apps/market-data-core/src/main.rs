//! Market Data Core Binary
//!
//! Starts the market data distribution and alerting core.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-data-core
//! ```
//!
//! # Environment Variables
//!
//! All optional:
//! - `MARKET_DATA_UPSTREAM_URL`: Primary WebSocket feed URL
//! - `MARKET_DATA_FALLBACK_URL`: Fallback HTTP price endpoint
//! - `MARKET_DATA_SYMBOLS`: Comma-separated symbol list (default: full feed table)
//! - `MARKET_DATA_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `MARKET_DATA_BACKOFF_MODE`: "exponential" | "fixed" (default: exponential)
//! - `MARKET_DATA_MAX_RECONNECT_ATTEMPTS`: 0 = unlimited (default: 0)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: market-data-core)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use market_data_core::application::ports::LoggingNotificationSink;
use market_data_core::infrastructure::fallback::HttpFallbackSource;
use market_data_core::infrastructure::telemetry;
use market_data_core::{
    AlertBook, CoreConfig, FeedClient, FeedEvent, HealthServer, HealthServerState,
    NotificationStore, PriceAggregator, QuoteBook, StreamMultiplexer, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
#[allow(clippy::expect_used)]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Market Data Core");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics()?;

    let config = CoreConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Domain state shared by the services
    let quotes = Arc::new(QuoteBook::new());
    let alerts = Arc::new(AlertBook::new());
    let notifications = Arc::new(NotificationStore::new());

    // Transport event channel and outbound frame channel
    let (event_tx, event_rx) = mpsc::channel::<FeedEvent>(config.channels.event_capacity);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

    // Upstream feed client
    let (feed_client, feed_handle) =
        FeedClient::new(config.feed_client_config(), event_tx, shutdown_token.clone());

    // Multiplexer consumes transport events and routes them to subscribers
    let multiplexer = Arc::new(StreamMultiplexer::new(outbound_tx));

    // Forward outbound frames from the multiplexer to the feed. Sends while
    // disconnected are dropped with a warning; the multiplexer replays the
    // subscription table on every reconnect.
    let forward_feed = feed_handle.clone();
    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            forward_feed.send(frame);
        }
    });

    // Spawn event pump
    let pump_multiplexer = Arc::clone(&multiplexer);
    let pump_cancel = shutdown_token.clone();
    tokio::spawn(async move {
        pump_multiplexer.pump(event_rx, pump_cancel).await;
    });

    // Spawn feed client
    tokio::spawn(async move {
        if let Err(e) = feed_client.run().await {
            tracing::error!(error = %e, "Feed client error");
        }
    });

    // Aggregator ties quotes, alerts, and notifications together
    let aggregator = Arc::new(PriceAggregator::new(
        Arc::clone(&multiplexer),
        Arc::clone(&quotes),
        Arc::clone(&alerts),
        Arc::clone(&notifications),
        Arc::new(LoggingNotificationSink),
    ));

    for symbol in &config.symbols {
        aggregator.track_symbol(symbol);
    }

    // Spawn fallback poller
    let fallback = Arc::new(HttpFallbackSource::new(&config.fallback_config())?);
    let poller_aggregator = Arc::clone(&aggregator);
    let poller_cancel = shutdown_token.clone();
    let poll_interval = config.fallback.poll_interval;
    tokio::spawn(async move {
        poller_aggregator
            .run_fallback_poller(fallback, poll_interval, poller_cancel)
            .await;
    });

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        feed_handle,
        Arc::clone(&multiplexer),
        Arc::clone(&notifications),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!(symbols = config.symbols.len(), "Market data core ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("Market data core stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &CoreConfig) {
    tracing::info!(
        upstream_url = %config.upstream.url,
        fallback_url = %config.fallback.url,
        health_port = config.server.health_port,
        symbols = ?config.symbols,
        "Configuration loaded"
    );
    tracing::debug!(
        backoff_mode = config.upstream.backoff_mode.as_str(),
        reconnect_delay_initial_ms = config.upstream.reconnect_delay_initial.as_millis() as u64,
        reconnect_delay_max_secs = config.upstream.reconnect_delay_max.as_secs(),
        max_reconnect_attempts = config.upstream.max_reconnect_attempts,
        heartbeat_interval_secs = config.upstream.heartbeat_interval.as_secs(),
        fallback_poll_interval_secs = config.fallback.poll_interval.as_secs(),
        "Reconnect and polling settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
