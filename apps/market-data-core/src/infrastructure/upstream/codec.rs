//! Feed Frame Codec
//!
//! JSON encoding and decoding for the upstream price feed. A frame that
//! fails to decode is a per-frame error: the caller logs it and drops the
//! single frame, the connection stays open.

use super::messages::{FeedMessage, OutboundFrame};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is not a JSON object.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the upstream feed.
#[derive(Debug, Default, Clone)]
pub struct FeedCodec;

impl FeedCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object or fails to
    /// deserialize.
    pub fn decode(&self, text: &str) -> Result<FeedMessage, CodecError> {
        let trimmed = text.trim();

        if !trimmed.starts_with('{') {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {preview}..."
            )));
        }

        Ok(serde_json::from_str(trimmed)?)
    }

    /// Encode an outbound frame to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, frame: &OutboundFrame) -> Result<String, CodecError> {
        Ok(serde_json::to_string(frame)?)
    }
}
