//! Channel Routing Types
//!
//! Domain types for fanning inbound feed messages out to subscribers.
//!
//! # Design
//!
//! The channel router tracks:
//! - Which logical channels have live subscribers
//! - A stable token per subscriber, so "unsubscribe twice" and
//!   "subscribe twice" are well-defined
//! - The channel transitions (empty → non-empty and back) that require an
//!   upstream protocol message
//!
//! This allows many subscribers to share one upstream subscription while
//! exactly one subscribe message is sent when a channel gains its first
//! subscriber and exactly one unsubscribe when it loses its last.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tokio::sync::mpsc;

// =============================================================================
// Types
// =============================================================================

/// A logical channel name used to route inbound messages.
pub type Channel = String;

/// Stable identity of a single subscription.
///
/// Returned from [`ChannelRouter::subscribe`] and required to remove that
/// subscription. Tokens are never reused within a router's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

impl SubscriptionToken {
    /// Raw token value, for logging.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

// =============================================================================
// Route Changes
// =============================================================================

/// Changes to upstream subscriptions produced by a routing-table mutation.
#[derive(Debug, Clone, Default)]
pub struct RouteChange {
    /// Channels that need an upstream subscribe message.
    pub subscribe: HashSet<Channel>,
    /// Channels that need an upstream unsubscribe message.
    pub unsubscribe: HashSet<Channel>,
}

impl RouteChange {
    /// Check if there are any changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }

    /// Create changes with only subscribes.
    #[must_use]
    pub fn subscribe_only(channels: impl IntoIterator<Item = Channel>) -> Self {
        Self {
            subscribe: channels.into_iter().collect(),
            unsubscribe: HashSet::new(),
        }
    }

    /// Create changes with only unsubscribes.
    #[must_use]
    pub fn unsubscribe_only(channels: impl IntoIterator<Item = Channel>) -> Self {
        Self {
            subscribe: HashSet::new(),
            unsubscribe: channels.into_iter().collect(),
        }
    }
}

// =============================================================================
// Router State
// =============================================================================

struct RouterState<M> {
    /// Map from channel name to the senders of its live subscribers.
    channels: HashMap<Channel, HashMap<SubscriptionToken, mpsc::UnboundedSender<M>>>,
    /// Next token value to hand out.
    next_token: u64,
}

impl<M> Default for RouterState<M> {
    fn default() -> Self {
        Self {
            channels: HashMap::new(),
            next_token: 0,
        }
    }
}

// =============================================================================
// Channel Router
// =============================================================================

/// Routing table from channel names to subscriber sets.
///
/// Thread-safe; owned exclusively by the multiplexer. External callers only
/// read snapshots or go through the mutation methods — the maps themselves
/// are never exposed.
///
/// # Example
///
/// ```rust
/// use market_data_core::domain::routing::ChannelRouter;
///
/// let router: ChannelRouter<String> = ChannelRouter::new();
///
/// // First subscriber triggers an upstream subscribe
/// let (token, mut rx, change) = router.subscribe("prices.btc");
/// assert!(change.subscribe.contains("prices.btc"));
///
/// // A second subscriber does not
/// let (_t2, _rx2, change) = router.subscribe("prices.btc");
/// assert!(change.is_empty());
///
/// router.route("prices.btc", "42.5".to_string());
/// assert_eq!(rx.try_recv().unwrap(), "42.5");
///
/// // Removing the first subscriber leaves the channel routed
/// let change = router.unsubscribe("prices.btc", token);
/// assert!(change.unsubscribe.is_empty());
/// ```
pub struct ChannelRouter<M> {
    inner: RwLock<RouterState<M>>,
}

impl<M: Clone> Default for ChannelRouter<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Clone> ChannelRouter<M> {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RouterState::default()),
        }
    }

    /// Register a new subscriber on `channel`.
    ///
    /// Returns the subscriber's token, the receiving half of its message
    /// queue, and the upstream change (a subscribe entry exactly when the
    /// channel transitioned from empty to non-empty).
    pub fn subscribe(
        &self,
        channel: &str,
    ) -> (SubscriptionToken, mpsc::UnboundedReceiver<M>, RouteChange) {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.inner.write();
        let token = SubscriptionToken(state.next_token);
        state.next_token += 1;

        let entry = state.channels.entry(channel.to_string()).or_default();
        let was_empty = entry.is_empty();
        entry.insert(token, tx);

        let change = if was_empty {
            RouteChange::subscribe_only([channel.to_string()])
        } else {
            RouteChange::default()
        };

        (token, rx, change)
    }

    /// Remove one subscriber from `channel`.
    ///
    /// Idempotent: unknown channels and already-removed tokens are no-ops.
    /// Returns an unsubscribe entry exactly when the channel's subscriber
    /// set became empty (the channel entry is deleted at that point).
    pub fn unsubscribe(&self, channel: &str, token: SubscriptionToken) -> RouteChange {
        let mut state = self.inner.write();

        let Some(entry) = state.channels.get_mut(channel) else {
            return RouteChange::default();
        };

        entry.remove(&token);

        if entry.is_empty() {
            state.channels.remove(channel);
            RouteChange::unsubscribe_only([channel.to_string()])
        } else {
            RouteChange::default()
        }
    }

    /// Force-remove a whole channel regardless of remaining subscribers.
    ///
    /// Used for symbol-keyed teardown. Returns an unsubscribe entry when
    /// the channel existed.
    pub fn drop_channel(&self, channel: &str) -> RouteChange {
        let mut state = self.inner.write();

        if state.channels.remove(channel).is_some() {
            RouteChange::unsubscribe_only([channel.to_string()])
        } else {
            RouteChange::default()
        }
    }

    /// Deliver `message` to every subscriber registered under `channel`.
    ///
    /// Messages for channels with no registered subscribers are dropped
    /// silently. Subscribers whose receiving half has been dropped are
    /// pruned. Returns the number of subscribers the message reached.
    pub fn route(&self, channel: &str, message: M) -> usize {
        let mut state = self.inner.write();

        let Some(entry) = state.channels.get_mut(channel) else {
            tracing::trace!(channel, "dropping message for unrouted channel");
            return 0;
        };

        let mut delivered = 0;
        entry.retain(|token, tx| {
            if tx.send(message.clone()).is_ok() {
                delivered += 1;
                true
            } else {
                tracing::debug!(channel, token = token.value(), "pruning closed subscriber");
                false
            }
        });

        delivered
    }

    /// Snapshot of all channels currently routed.
    ///
    /// Used to replay subscriptions after a reconnect.
    #[must_use]
    pub fn active_channels(&self) -> Vec<Channel> {
        self.inner.read().channels.keys().cloned().collect()
    }

    /// Check whether `channel` has at least one subscriber.
    #[must_use]
    pub fn is_routed(&self, channel: &str) -> bool {
        self.inner.read().channels.contains_key(channel)
    }

    /// Get routing statistics.
    #[must_use]
    pub fn stats(&self) -> RoutingStats {
        let state = self.inner.read();
        RoutingStats {
            channel_count: state.channels.len(),
            subscriber_count: state.channels.values().map(HashMap::len).sum(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Routing table statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingStats {
    /// Number of channels with at least one subscriber.
    pub channel_count: usize,
    /// Total subscribers across all channels.
    pub subscriber_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
