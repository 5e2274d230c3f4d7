//! Core Configuration Settings
//!
//! Configuration for the market-data core, loaded from `MARKET_DATA_*`
//! environment variables with sensible defaults for every knob. Only a
//! malformed symbol list is a hard error; unparsable numeric values fall
//! back to their defaults.

use std::time::Duration;

use crate::infrastructure::fallback::FallbackConfig;
use crate::infrastructure::upstream::symbols::feed_id_for_symbol;
use crate::infrastructure::upstream::{
    BackoffMode, FeedClientConfig, HeartbeatConfig, ReconnectConfig,
};

/// Upstream WebSocket settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// WebSocket URL of the primary price feed.
    pub url: String,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Heartbeat timeout before the connection is considered dead.
    pub heartbeat_timeout: Duration,
    /// Backoff mode between reconnection attempts.
    pub backoff_mode: BackoffMode,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay (exponential mode).
    pub reconnect_delay_max: Duration,
    /// Delay multiplier per attempt (exponential mode).
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            url: "wss://hermes.pyth.network/ws".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(30),
            backoff_mode: BackoffMode::Exponential,
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

/// Fallback HTTP source settings.
#[derive(Debug, Clone)]
pub struct FallbackSettings {
    /// Base URL of the fallback price endpoint.
    pub url: String,
    /// How often to poll for symbols with no quote yet.
    pub poll_interval: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            url: "https://api.coingecko.com/api/v3/simple/price".to_string(),
            poll_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8082 }
    }
}

/// Channel capacity settings.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Capacity of the transport event channel.
    pub event_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            event_capacity: 1_024,
        }
    }
}

/// Complete core configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Upstream WebSocket settings.
    pub upstream: UpstreamSettings,
    /// Fallback HTTP source settings.
    pub fallback: FallbackSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Channel capacity settings.
    pub channels: ChannelSettings,
    /// Symbols tracked at startup.
    pub symbols: Vec<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamSettings::default(),
            fallback: FallbackSettings::default(),
            server: ServerSettings::default(),
            channels: ChannelSettings::default(),
            symbols: default_symbols(),
        }
    }
}

impl CoreConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured URL is empty or the symbol list
    /// names an instrument the feed table does not know.
    pub fn from_env() -> Result<Self, ConfigError> {
        let upstream_defaults = UpstreamSettings::default();
        let upstream = UpstreamSettings {
            url: parse_env_url("MARKET_DATA_UPSTREAM_URL", &upstream_defaults.url)?,
            heartbeat_interval: parse_env_duration_secs(
                "MARKET_DATA_HEARTBEAT_INTERVAL_SECS",
                upstream_defaults.heartbeat_interval,
            ),
            heartbeat_timeout: parse_env_duration_secs(
                "MARKET_DATA_HEARTBEAT_TIMEOUT_SECS",
                upstream_defaults.heartbeat_timeout,
            ),
            backoff_mode: std::env::var("MARKET_DATA_BACKOFF_MODE")
                .map(|s| BackoffMode::from_str_case_insensitive(&s))
                .unwrap_or(upstream_defaults.backoff_mode),
            reconnect_delay_initial: parse_env_duration_millis(
                "MARKET_DATA_RECONNECT_DELAY_INITIAL_MS",
                upstream_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                "MARKET_DATA_RECONNECT_DELAY_MAX_SECS",
                upstream_defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env_f64(
                "MARKET_DATA_RECONNECT_DELAY_MULTIPLIER",
                upstream_defaults.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: parse_env_u32(
                "MARKET_DATA_MAX_RECONNECT_ATTEMPTS",
                upstream_defaults.max_reconnect_attempts,
            ),
        };

        let fallback_defaults = FallbackSettings::default();
        let fallback = FallbackSettings {
            url: parse_env_url("MARKET_DATA_FALLBACK_URL", &fallback_defaults.url)?,
            poll_interval: parse_env_duration_secs(
                "MARKET_DATA_FALLBACK_POLL_INTERVAL_SECS",
                fallback_defaults.poll_interval,
            ),
            request_timeout: parse_env_duration_secs(
                "MARKET_DATA_FALLBACK_TIMEOUT_SECS",
                fallback_defaults.request_timeout,
            ),
        };

        let server = ServerSettings {
            health_port: parse_env_u16(
                "MARKET_DATA_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let channels = ChannelSettings {
            event_capacity: parse_env_usize(
                "MARKET_DATA_EVENT_CAPACITY",
                ChannelSettings::default().event_capacity,
            ),
        };

        let symbols = match std::env::var("MARKET_DATA_SYMBOLS") {
            Ok(raw) => parse_symbols(&raw)?,
            Err(_) => default_symbols(),
        };

        Ok(Self {
            upstream,
            fallback,
            server,
            channels,
            symbols,
        })
    }

    /// Build the feed client configuration.
    #[must_use]
    pub fn feed_client_config(&self) -> FeedClientConfig {
        FeedClientConfig {
            url: self.upstream.url.clone(),
            reconnect: ReconnectConfig {
                mode: self.upstream.backoff_mode,
                initial_delay: self.upstream.reconnect_delay_initial,
                max_delay: self.upstream.reconnect_delay_max,
                multiplier: self.upstream.reconnect_delay_multiplier,
                jitter_factor: 0.1,
                max_attempts: self.upstream.max_reconnect_attempts,
            },
            heartbeat: HeartbeatConfig::new(
                self.upstream.heartbeat_interval,
                self.upstream.heartbeat_timeout,
            ),
        }
    }

    /// Build the fallback source configuration.
    #[must_use]
    pub fn fallback_config(&self) -> FallbackConfig {
        FallbackConfig::new(self.fallback.url.clone(), self.fallback.request_timeout)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has an empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// The symbol list names an instrument the feed table does not know.
    #[error("unknown symbol in MARKET_DATA_SYMBOLS: {0}")]
    UnknownSymbol(String),
}

/// Every symbol the feed table knows.
fn default_symbols() -> Vec<String> {
    crate::infrastructure::upstream::FEED_SYMBOLS
        .iter()
        .map(|entry| entry.symbol.to_string())
        .collect()
}

/// Parse a comma-separated symbol list, validating against the feed table.
fn parse_symbols(raw: &str) -> Result<Vec<String>, ConfigError> {
    let mut symbols = Vec::new();
    for part in raw.split(',') {
        let symbol = part.trim();
        if symbol.is_empty() {
            continue;
        }
        if feed_id_for_symbol(symbol).is_none() {
            return Err(ConfigError::UnknownSymbol(symbol.to_string()));
        }
        symbols.push(symbol.to_string());
    }
    Ok(symbols)
}

fn parse_env_url(key: &str, default: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        Ok(value) => Ok(value),
        Err(_) => Ok(default.to_string()),
    }
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
