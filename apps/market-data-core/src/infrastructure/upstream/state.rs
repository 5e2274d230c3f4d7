//! Connection State
//!
//! Read-only snapshot of the upstream connection, published by the feed
//! client through a `tokio::sync::watch` channel so the health endpoint and
//! API callers can observe it without touching the socket loop.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle phase of the upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Not connected and not currently trying.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Socket open and processing frames.
    Connected,
    /// The last attempt failed; a retry may be pending.
    Error,
}

impl ConnectionStatus {
    /// Get the status name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

/// Snapshot of the upstream connection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionState {
    /// Current lifecycle phase.
    pub status: ConnectionStatus,
    /// Reconnection attempt counter; 0 while connected.
    pub reconnect_attempt: u32,
    /// When the last heartbeat response (or any inbound frame) arrived.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

impl ConnectionState {
    /// Whether frames can currently be sent.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self.status, ConnectionStatus::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_disconnected() {
        let state = ConnectionState::default();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert_eq!(state.reconnect_attempt, 0);
        assert!(state.last_heartbeat_at.is_none());
        assert!(!state.is_connected());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ConnectionStatus::Connected).unwrap();
        assert_eq!(json, r#""connected""#);
    }

    #[test]
    fn snapshot_serializes_for_health() {
        let state = ConnectionState {
            status: ConnectionStatus::Error,
            reconnect_attempt: 3,
            last_heartbeat_at: None,
        };
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["status"], "error");
        assert_eq!(json["reconnect_attempt"], 3);
    }
}
