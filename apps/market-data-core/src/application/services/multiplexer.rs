//! Stream Multiplexer
//!
//! Fans the single upstream connection out to many independent subscribers.
//! The routing table decides when a channel needs an upstream subscribe or
//! unsubscribe; this service turns those transitions into outbound frames
//! and replays the full channel set after every reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::routing::{ChannelRouter, RouteChange, RoutingStats, SubscriptionToken};
use crate::infrastructure::upstream::{FeedEvent, FeedMessage, OutboundFrame};

// =============================================================================
// Subscription Handle
// =============================================================================

/// One subscriber's end of a multiplexed channel.
///
/// Receives every message routed to the channel. Unsubscribing is
/// idempotent; dropping the handle unsubscribes as well.
pub struct SubscriptionHandle {
    channel: String,
    token: SubscriptionToken,
    receiver: mpsc::UnboundedReceiver<FeedMessage>,
    router: Arc<ChannelRouter<FeedMessage>>,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    active: bool,
}

impl SubscriptionHandle {
    /// The channel this handle is subscribed to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Receive the next message routed to this channel.
    ///
    /// Returns `None` once the subscription has been torn down.
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        self.receiver.recv().await
    }

    /// Receive without waiting.
    ///
    /// # Errors
    ///
    /// Returns the underlying channel error when no message is queued or
    /// the subscription has been torn down.
    pub fn try_recv(&mut self) -> Result<FeedMessage, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Remove this subscription. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        let change = self.router.unsubscribe(&self.channel, self.token);
        send_route_change(&self.outbound, &change);
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("channel", &self.channel)
            .field("token", &self.token.value())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Multiplexer
// =============================================================================

/// Multiplexes one upstream feed across many subscribers.
pub struct StreamMultiplexer {
    router: Arc<ChannelRouter<FeedMessage>>,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    frames_received: AtomicU64,
}

impl StreamMultiplexer {
    /// Create a new multiplexer.
    ///
    /// `outbound` carries the subscribe/unsubscribe frames this service
    /// decides to send; in production it drains into the feed client's
    /// command channel.
    #[must_use]
    pub fn new(outbound: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self {
            router: Arc::new(ChannelRouter::new()),
            outbound,
            frames_received: AtomicU64::new(0),
        }
    }

    /// Subscribe to a channel.
    ///
    /// The first subscriber on a channel triggers exactly one upstream
    /// subscribe frame; later subscribers share the routed stream.
    #[must_use]
    pub fn subscribe(&self, channel: &str) -> SubscriptionHandle {
        let (token, receiver, change) = self.router.subscribe(channel);
        send_route_change(&self.outbound, &change);

        SubscriptionHandle {
            channel: channel.to_string(),
            token,
            receiver,
            router: Arc::clone(&self.router),
            outbound: self.outbound.clone(),
            active: true,
        }
    }

    /// Force-remove a whole channel, unsubscribing upstream if it was
    /// routed. Remaining handles on the channel stop receiving.
    pub fn drop_channel(&self, channel: &str) {
        let change = self.router.drop_channel(channel);
        send_route_change(&self.outbound, &change);
    }

    /// Send an arbitrary frame upstream.
    pub fn send_raw(&self, frame: OutboundFrame) {
        if self.outbound.send(frame).is_err() {
            tracing::warn!("Outbound frame channel closed, frame dropped");
        }
    }

    /// Check whether a channel currently has subscribers.
    #[must_use]
    pub fn is_routed(&self, channel: &str) -> bool {
        self.router.is_routed(channel)
    }

    /// Routing statistics for health reporting.
    #[must_use]
    pub fn stats(&self) -> RoutingStats {
        self.router.stats()
    }

    /// Total decoded frames seen since startup.
    #[must_use]
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Handle one transport event.
    pub fn handle_event(&self, event: FeedEvent) {
        match event {
            FeedEvent::Connected => {
                self.replay_subscriptions();
            }
            FeedEvent::Message(message) => {
                self.frames_received.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("market_data_frames_received_total").increment(1);
                if let Some(channel) = message.channel() {
                    let channel = channel.to_string();
                    let delivered = self.router.route(&channel, message);
                    if delivered == 0 {
                        metrics::counter!("market_data_frames_dropped_total").increment(1);
                    }
                }
            }
            FeedEvent::Disconnected => {
                // Routing table survives; channels replay on reconnect.
                tracing::debug!("Upstream disconnected, keeping routing table");
            }
            FeedEvent::Reconnecting { attempt } => {
                metrics::counter!("market_data_reconnects_total").increment(1);
                tracing::debug!(attempt, "Upstream reconnecting");
            }
            FeedEvent::Error(message) => {
                tracing::warn!(error = %message, "Upstream reported error");
            }
        }
    }

    /// Pump transport events until the channel closes or cancellation.
    pub async fn pump(
        self: Arc<Self>,
        mut events: mpsc::Receiver<FeedEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Event pump cancelled");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::info!("Transport event channel closed");
                        break;
                    };
                    self.handle_event(event);
                }
            }
        }
    }

    /// Re-issue one subscribe frame covering every routed channel.
    ///
    /// Reconnection must not silently drop subscriptions (the server lost
    /// its per-connection state with the old socket).
    fn replay_subscriptions(&self) {
        let mut channels = self.router.active_channels();
        if channels.is_empty() {
            return;
        }
        channels.sort();

        tracing::info!(count = channels.len(), "Replaying channel subscriptions");
        self.send_raw(OutboundFrame::subscribe(channels));
    }
}

/// Turn a routing transition into outbound frames.
fn send_route_change(outbound: &mpsc::UnboundedSender<OutboundFrame>, change: &RouteChange) {
    if !change.subscribe.is_empty() {
        let _ = outbound.send(OutboundFrame::subscribe(change.subscribe.iter().cloned()));
    }
    if !change.unsubscribe.is_empty() {
        let _ = outbound.send(OutboundFrame::unsubscribe(
            change.unsubscribe.iter().cloned(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::infrastructure::upstream::{PricePayload, PriceUpdateMessage};

    fn price_update(id: &str, price: i64) -> FeedMessage {
        FeedMessage::PriceUpdate(PriceUpdateMessage {
            id: id.to_string(),
            price: PricePayload {
                price: Decimal::from(price),
                conf: Decimal::ONE,
            },
        })
    }

    fn setup() -> (StreamMultiplexer, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (StreamMultiplexer::new(tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<OutboundFrame>) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn first_subscriber_sends_one_subscribe_frame() {
        let (mux, mut rx) = setup();

        let _handle = mux.subscribe("feed1");

        let frames = drain(&mut rx);
        assert_eq!(frames, vec![OutboundFrame::subscribe(["feed1".to_string()])]);
    }

    #[tokio::test]
    async fn second_subscriber_sends_nothing() {
        let (mux, mut rx) = setup();

        let _h1 = mux.subscribe("feed1");
        drain(&mut rx);
        let _h2 = mux.subscribe("feed1");

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn last_unsubscribe_sends_one_unsubscribe_frame() {
        let (mux, mut rx) = setup();

        let mut h1 = mux.subscribe("feed1");
        let mut h2 = mux.subscribe("feed1");
        drain(&mut rx);

        h1.unsubscribe();
        assert!(drain(&mut rx).is_empty());

        h2.unsubscribe();
        let frames = drain(&mut rx);
        assert_eq!(
            frames,
            vec![OutboundFrame::unsubscribe(["feed1".to_string()])]
        );
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let (mux, mut rx) = setup();

        let mut handle = mux.subscribe("feed1");
        drain(&mut rx);

        handle.unsubscribe();
        handle.unsubscribe();
        handle.unsubscribe();

        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn dropping_the_handle_unsubscribes() {
        let (mux, mut rx) = setup();

        let handle = mux.subscribe("feed1");
        drain(&mut rx);
        drop(handle);

        let frames = drain(&mut rx);
        assert_eq!(
            frames,
            vec![OutboundFrame::unsubscribe(["feed1".to_string()])]
        );
        assert!(!mux.is_routed("feed1"));
    }

    #[tokio::test]
    async fn messages_route_to_all_channel_subscribers() {
        let (mux, _rx) = setup();

        let mut h1 = mux.subscribe("feed1");
        let mut h2 = mux.subscribe("feed1");
        let mut other = mux.subscribe("feed2");

        mux.handle_event(FeedEvent::Message(price_update("feed1", 100)));

        assert!(h1.try_recv().is_ok());
        assert!(h2.try_recv().is_ok());
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn unrouted_messages_are_dropped() {
        let (mux, _rx) = setup();

        // No subscribers at all; must not panic or error.
        mux.handle_event(FeedEvent::Message(price_update("feed9", 1)));
    }

    #[tokio::test]
    async fn control_frames_are_not_routed() {
        let (mux, _rx) = setup();
        let mut handle = mux.subscribe("feed1");

        mux.handle_event(FeedEvent::Message(FeedMessage::Pong));

        assert!(handle.try_recv().is_err());
    }

    #[tokio::test]
    async fn reconnect_replays_all_routed_channels_once() {
        let (mux, mut rx) = setup();

        let _h1 = mux.subscribe("feed1");
        let _h2 = mux.subscribe("feed2");
        let _h3 = mux.subscribe("feed2");
        drain(&mut rx);

        mux.handle_event(FeedEvent::Connected);

        let frames = drain(&mut rx);
        assert_eq!(
            frames,
            vec![OutboundFrame::subscribe([
                "feed1".to_string(),
                "feed2".to_string()
            ])]
        );
    }

    #[tokio::test]
    async fn reconnect_with_no_channels_sends_nothing() {
        let (mux, mut rx) = setup();

        mux.handle_event(FeedEvent::Connected);

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn drop_channel_tears_down_every_subscriber() {
        let (mux, mut rx) = setup();

        let mut h1 = mux.subscribe("feed1");
        let _h2 = mux.subscribe("feed1");
        drain(&mut rx);

        mux.drop_channel("feed1");

        let frames = drain(&mut rx);
        assert_eq!(
            frames,
            vec![OutboundFrame::unsubscribe(["feed1".to_string()])]
        );

        // Routed messages no longer reach the orphaned handles.
        mux.handle_event(FeedEvent::Message(price_update("feed1", 100)));
        assert!(matches!(
            h1.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn send_raw_passes_frames_through() {
        let (mux, mut rx) = setup();

        mux.send_raw(OutboundFrame::subscribe(["custom".to_string()]));

        assert_eq!(
            drain(&mut rx),
            vec![OutboundFrame::subscribe(["custom".to_string()])]
        );
    }

    #[tokio::test]
    async fn disconnect_keeps_the_routing_table() {
        let (mux, _rx) = setup();
        let _handle = mux.subscribe("feed1");

        mux.handle_event(FeedEvent::Disconnected);

        assert!(mux.is_routed("feed1"));
    }
}
