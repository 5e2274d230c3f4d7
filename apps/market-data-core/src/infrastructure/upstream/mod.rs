//! Upstream Feed Transport
//!
//! WebSocket client for the primary price feed: connection lifecycle with
//! reconnect backoff, heartbeat monitoring, JSON frame codec, and the static
//! feed-id lookup table.

/// WebSocket client and connection loop.
pub mod client;
/// JSON frame codec.
pub mod codec;
/// Heartbeat monitoring.
pub mod heartbeat;
/// Serde wire types.
pub mod messages;
/// Reconnection backoff policy.
pub mod reconnect;
/// Published connection state snapshots.
pub mod state;
/// Feed id lookup table.
pub mod symbols;

pub use client::{FeedClient, FeedClientConfig, FeedClientError, FeedEvent, FeedHandle};
pub use codec::{CodecError, FeedCodec};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
pub use messages::{FeedMessage, OutboundFrame, PricePayload, PriceUpdateMessage};
pub use reconnect::{BackoffMode, ReconnectConfig, ReconnectPolicy};
pub use state::{ConnectionState, ConnectionStatus};
pub use symbols::{
    FEED_SYMBOLS, FeedSymbol, asset_key_for_symbol, feed_id_for_symbol, symbol_for_asset_key,
    symbol_for_feed_id,
};
