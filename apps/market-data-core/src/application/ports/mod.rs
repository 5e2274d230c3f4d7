//! Application Ports
//!
//! Trait seams between the orchestration services and the outside world.
//! Infrastructure adapters implement these; tests substitute mocks.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::notification::{DeliveryDecision, Notification};

/// Errors from the fallback price source.
#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    /// Request failed at the transport level.
    #[error("fallback request failed: {0}")]
    Network(String),

    /// The source answered with a non-success status.
    #[error("fallback API error: status {status}")]
    Api {
        /// HTTP status code.
        status: u16,
    },

    /// Response body could not be parsed.
    #[error("fallback response parse error: {0}")]
    Parse(String),
}

/// Secondary price source consulted for symbols the primary feed has not
/// priced yet.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FallbackSource: Send + Sync {
    /// Fetch current USD prices for the given asset keys.
    ///
    /// The result maps asset key to price; keys the source does not know
    /// are simply absent.
    ///
    /// # Errors
    ///
    /// Returns [`FallbackError`] when the request or response handling
    /// fails. Callers treat this as a degraded-freshness event, not a
    /// fault.
    async fn fetch_prices(
        &self,
        asset_keys: &[String],
    ) -> Result<HashMap<String, Decimal>, FallbackError>;
}

/// Receiver of notification delivery side effects (sound, desktop popup).
///
/// The store records every notification regardless; this port only carries
/// the audible/visual effects the delivery decision allows. UI collaborators
/// plug in here.
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification with its gating decision.
    fn deliver(&self, notification: &Notification, decision: &DeliveryDecision);
}

/// Sink that only logs deliveries.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotificationSink;

impl NotificationSink for LoggingNotificationSink {
    fn deliver(&self, notification: &Notification, decision: &DeliveryDecision) {
        tracing::info!(
            id = %notification.id,
            priority = ?notification.priority,
            title = %notification.title,
            sound = decision.sound,
            desktop = decision.desktop,
            "Notification delivered"
        );
    }
}
