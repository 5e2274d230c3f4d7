//! Upstream Wire Types
//!
//! Serde types for the JSON frames exchanged with the upstream price feed.
//!
//! # Protocol
//!
//! Outbound:
//! ```json
//! {"type":"subscribe","ids":["e62df6..."]}
//! {"type":"unsubscribe","ids":["e62df6..."]}
//! ```
//!
//! Inbound:
//! ```json
//! {"type":"price_update","price":{"price":4.56,"conf":0.002},"id":"03ae4d..."}
//! ```
//!
//! The `id` values are opaque upstream feed identifiers; the mapping to
//! human-readable symbols lives in [`super::symbols`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Outbound Frames
// =============================================================================

/// A frame the core sends upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Start receiving updates for the given feed ids.
    Subscribe {
        /// Upstream feed ids.
        ids: Vec<String>,
    },
    /// Stop receiving updates for the given feed ids.
    Unsubscribe {
        /// Upstream feed ids.
        ids: Vec<String>,
    },
}

impl OutboundFrame {
    /// Build a subscribe frame.
    #[must_use]
    pub fn subscribe(ids: impl IntoIterator<Item = String>) -> Self {
        Self::Subscribe {
            ids: ids.into_iter().collect(),
        }
    }

    /// Build an unsubscribe frame.
    #[must_use]
    pub fn unsubscribe(ids: impl IntoIterator<Item = String>) -> Self {
        Self::Unsubscribe {
            ids: ids.into_iter().collect(),
        }
    }

    /// The feed ids the frame refers to.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        match self {
            Self::Subscribe { ids } | Self::Unsubscribe { ids } => ids,
        }
    }
}

// =============================================================================
// Inbound Messages
// =============================================================================

/// Price payload of a `price_update` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePayload {
    /// Last price.
    pub price: Decimal,
    /// Confidence interval around the price.
    pub conf: Decimal,
}

/// One `price_update` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdateMessage {
    /// Opaque upstream feed id.
    pub id: String,
    /// Price payload.
    pub price: PricePayload,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    /// A per-feed price update.
    PriceUpdate(PriceUpdateMessage),
    /// Application-level keepalive response.
    Pong,
    /// Any frame type this client does not understand. Dropped by the
    /// router (no channel), kept so new server-side types are not a
    /// decode error.
    #[serde(other)]
    Unknown,
}

impl FeedMessage {
    /// The routing channel of this message, if it has one.
    ///
    /// Price updates route by their upstream feed id; control frames are
    /// not routed.
    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::PriceUpdate(update) => Some(&update.id),
            Self::Pong | Self::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_frame_wire_shape() {
        let frame = OutboundFrame::subscribe(["abc123".to_string()]);
        let json = serde_json::to_string(&frame).unwrap();

        assert_eq!(json, r#"{"type":"subscribe","ids":["abc123"]}"#);
    }

    #[test]
    fn unsubscribe_frame_wire_shape() {
        let frame = OutboundFrame::unsubscribe(["abc123".to_string(), "def456".to_string()]);
        let json = serde_json::to_string(&frame).unwrap();

        assert_eq!(json, r#"{"type":"unsubscribe","ids":["abc123","def456"]}"#);
    }

    #[test]
    fn price_update_decodes() {
        let json = r#"{"type":"price_update","price":{"price":4.56,"conf":0.002},"id":"03ae4d"}"#;
        let message: FeedMessage = serde_json::from_str(json).unwrap();

        match message {
            FeedMessage::PriceUpdate(update) => {
                assert_eq!(update.id, "03ae4d");
                assert_eq!(update.price.price.to_string(), "4.56");
                assert_eq!(update.price.conf.to_string(), "0.002");
            }
            other => panic!("expected PriceUpdate, got {other:?}"),
        }
    }

    #[test]
    fn price_update_routes_by_feed_id() {
        let message = FeedMessage::PriceUpdate(PriceUpdateMessage {
            id: "03ae4d".to_string(),
            price: PricePayload {
                price: Decimal::ONE,
                conf: Decimal::ZERO,
            },
        });

        assert_eq!(message.channel(), Some("03ae4d"));
    }

    #[test]
    fn control_frames_are_unrouted() {
        assert_eq!(FeedMessage::Pong.channel(), None);
        assert_eq!(FeedMessage::Unknown.channel(), None);
    }

    #[test]
    fn unknown_frame_type_decodes_as_unknown() {
        let json = r#"{"type":"server_gossip","data":42}"#;
        let message: FeedMessage = serde_json::from_str(json).unwrap();

        assert_eq!(message, FeedMessage::Unknown);
    }
}
