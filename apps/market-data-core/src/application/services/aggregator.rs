//! Price Aggregator
//!
//! Consumes multiplexed price updates for the tracked symbols, maintains the
//! quote book, evaluates alerts on every accepted update, and emits one
//! notification per fired alert. A background poller seeds symbols the
//! primary feed has not priced yet from the fallback source.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FallbackSource, NotificationSink};
use crate::application::services::multiplexer::StreamMultiplexer;
use crate::domain::alert::{AlertBook, AlertCondition, PriceAlert};
use crate::domain::notification::{NotificationDraft, NotificationPriority, NotificationStore};
use crate::domain::quote::QuoteBook;
use crate::infrastructure::upstream::{
    FeedMessage, PriceUpdateMessage, asset_key_for_symbol, feed_id_for_symbol,
    symbol_for_asset_key,
};

/// A tracked symbol's subscription task.
struct TrackedSymbol {
    feed_id: &'static str,
    task: tokio::task::JoinHandle<()>,
}

/// Aggregates primary and fallback prices and drives alert evaluation.
pub struct PriceAggregator {
    multiplexer: Arc<StreamMultiplexer>,
    quotes: Arc<QuoteBook>,
    alerts: Arc<AlertBook>,
    notifications: Arc<NotificationStore>,
    sink: Arc<dyn NotificationSink>,
    tracked: RwLock<HashMap<String, TrackedSymbol>>,
}

impl PriceAggregator {
    /// Create a new aggregator.
    #[must_use]
    pub fn new(
        multiplexer: Arc<StreamMultiplexer>,
        quotes: Arc<QuoteBook>,
        alerts: Arc<AlertBook>,
        notifications: Arc<NotificationStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            multiplexer,
            quotes,
            alerts,
            notifications,
            sink,
            tracked: RwLock::new(HashMap::new()),
        }
    }

    /// Start tracking a symbol: subscribe to its feed channel and spawn the
    /// task that applies its updates.
    ///
    /// Returns `false` for unknown symbols and symbols already tracked.
    pub fn track_symbol(self: &Arc<Self>, symbol: &str) -> bool {
        let Some(feed_id) = feed_id_for_symbol(symbol) else {
            tracing::warn!(symbol, "Cannot track unknown symbol");
            return false;
        };

        let mut tracked = self.tracked.write();
        if tracked.contains_key(symbol) {
            return false;
        }

        let mut handle = self.multiplexer.subscribe(feed_id);
        let aggregator = Arc::clone(self);
        let task_symbol = symbol.to_string();
        let task = tokio::spawn(async move {
            while let Some(message) = handle.recv().await {
                if let FeedMessage::PriceUpdate(update) = message {
                    aggregator.apply_primary_update(&task_symbol, &update);
                }
            }
            tracing::debug!(symbol = %task_symbol, "Symbol update task ended");
        });

        tracked.insert(symbol.to_string(), TrackedSymbol { feed_id, task });
        tracing::info!(symbol, feed_id, "Tracking symbol");
        true
    }

    /// Stop tracking a symbol and tear down its feed channel.
    ///
    /// Returns `false` when the symbol was not tracked.
    pub fn untrack_symbol(&self, symbol: &str) -> bool {
        let Some(entry) = self.tracked.write().remove(symbol) else {
            return false;
        };

        // Dropping the channel closes the task's receiver, ending its loop.
        self.multiplexer.drop_channel(entry.feed_id);
        entry.task.abort();
        tracing::info!(symbol, "Stopped tracking symbol");
        true
    }

    /// Symbols currently tracked.
    #[must_use]
    pub fn tracked_symbols(&self) -> Vec<String> {
        self.tracked.read().keys().cloned().collect()
    }

    /// Apply one primary update: record the quote, then evaluate alerts at
    /// the new price.
    pub fn apply_primary_update(&self, symbol: &str, update: &PriceUpdateMessage) {
        self.quotes
            .apply_primary(symbol, update.price.price, update.price.conf, Utc::now());
        self.evaluate_alerts(symbol, update.price.price);
    }

    /// Run alert evaluation and emit a notification per fired alert.
    fn evaluate_alerts(&self, symbol: &str, price: Decimal) {
        for alert in self.alerts.check_alerts(price, symbol) {
            metrics::counter!("market_data_alerts_fired_total").increment(1);
            self.notify_alert_fired(&alert, price);
        }
    }

    /// Record and deliver the notification for one fired alert.
    fn notify_alert_fired(&self, alert: &PriceAlert, price: Decimal) {
        let direction = match alert.condition {
            AlertCondition::Above => "rose above",
            AlertCondition::Below => "fell below",
        };
        let draft = NotificationDraft {
            kind: "price_alert".to_string(),
            priority: NotificationPriority::High,
            title: format!("{} price alert", alert.symbol),
            message: format!(
                "{} {} {} (now {})",
                alert.symbol, direction, alert.target_price, price
            ),
        };

        let (id, decision) = self.notifications.add_notification(draft);
        metrics::counter!("market_data_notifications_created_total").increment(1);
        if !decision.any() {
            metrics::counter!("market_data_notifications_suppressed_total").increment(1);
        }

        if let Some(notification) = self.notifications.notification(id) {
            self.sink.deliver(&notification, &decision);
        }
    }

    /// Fetch fallback prices for every tracked symbol with no quote yet.
    ///
    /// Fetch errors are logged and swallowed; the affected symbols simply
    /// stay unpriced until the next poll or a primary update.
    pub async fn poll_fallback_once(&self, fallback: &dyn FallbackSource) {
        let tracked = self.tracked_symbols();
        let missing = self
            .quotes
            .missing_symbols(tracked.iter().map(String::as_str));
        if missing.is_empty() {
            return;
        }

        let asset_keys: Vec<String> = missing
            .iter()
            .filter_map(|symbol| asset_key_for_symbol(symbol))
            .map(ToString::to_string)
            .collect();
        if asset_keys.is_empty() {
            return;
        }

        metrics::counter!("market_data_fallback_polls_total").increment(1);

        match fallback.fetch_prices(&asset_keys).await {
            Ok(prices) => {
                let now = Utc::now();
                for (asset_key, price) in prices {
                    let Some(symbol) = symbol_for_asset_key(&asset_key) else {
                        continue;
                    };
                    if self.quotes.apply_fallback(symbol, price, now) {
                        tracing::debug!(symbol, %price, "Seeded fallback quote");
                    }
                }
            }
            Err(e) => {
                metrics::counter!("market_data_fallback_failures_total").increment(1);
                tracing::warn!(error = %e, "Fallback price fetch failed");
            }
        }
    }

    /// Run the fallback polling loop until cancelled.
    pub async fn run_fallback_poller(
        self: Arc<Self>,
        fallback: Arc<dyn FallbackSource>,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Fallback poller cancelled");
                    break;
                }
                _ = interval.tick() => {
                    self.poll_fallback_once(fallback.as_ref()).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::*;
    use crate::application::ports::{FallbackError, MockFallbackSource};
    use crate::domain::notification::{DeliveryDecision, Notification};
    use crate::domain::quote::QuoteSource;
    use crate::infrastructure::upstream::{OutboundFrame, PricePayload};

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<(Notification, DeliveryDecision)>>,
    }

    impl NotificationSink for RecordingSink {
        fn deliver(&self, notification: &Notification, decision: &DeliveryDecision) {
            self.delivered
                .lock()
                .push((notification.clone(), *decision));
        }
    }

    struct Fixture {
        aggregator: Arc<PriceAggregator>,
        quotes: Arc<QuoteBook>,
        alerts: Arc<AlertBook>,
        notifications: Arc<NotificationStore>,
        sink: Arc<RecordingSink>,
        outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    }

    fn fixture() -> Fixture {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let multiplexer = Arc::new(StreamMultiplexer::new(outbound_tx));
        let quotes = Arc::new(QuoteBook::new());
        let alerts = Arc::new(AlertBook::new());
        let notifications = Arc::new(NotificationStore::new());
        let sink = Arc::new(RecordingSink::default());

        let aggregator = Arc::new(PriceAggregator::new(
            multiplexer,
            Arc::clone(&quotes),
            Arc::clone(&alerts),
            Arc::clone(&notifications),
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
        ));

        Fixture {
            aggregator,
            quotes,
            alerts,
            notifications,
            sink,
            outbound_rx,
        }
    }

    fn update(price: i64) -> PriceUpdateMessage {
        PriceUpdateMessage {
            id: "test".to_string(),
            price: PricePayload {
                price: Decimal::from(price),
                conf: Decimal::ONE,
            },
        }
    }

    #[tokio::test]
    async fn tracking_a_symbol_subscribes_its_feed_channel() {
        let mut fx = fixture();

        assert!(fx.aggregator.track_symbol("BTC/USD"));

        let frame = fx.outbound_rx.try_recv().expect("subscribe frame sent");
        let expected = feed_id_for_symbol("BTC/USD").expect("known symbol");
        assert_eq!(frame.ids(), [expected]);
    }

    #[tokio::test]
    async fn unknown_symbols_are_rejected() {
        let fx = fixture();

        assert!(!fx.aggregator.track_symbol("XYZ/USD"));
        assert!(fx.aggregator.tracked_symbols().is_empty());
    }

    #[tokio::test]
    async fn tracking_twice_is_a_noop() {
        let mut fx = fixture();

        assert!(fx.aggregator.track_symbol("BTC/USD"));
        assert!(!fx.aggregator.track_symbol("BTC/USD"));

        // Only the first call produced a frame.
        let _ = fx.outbound_rx.try_recv().expect("first subscribe");
        assert!(fx.outbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn untracking_tears_down_the_channel() {
        let mut fx = fixture();

        fx.aggregator.track_symbol("BTC/USD");
        let _ = fx.outbound_rx.try_recv();

        assert!(fx.aggregator.untrack_symbol("BTC/USD"));

        let frame = fx.outbound_rx.try_recv().expect("unsubscribe frame sent");
        assert!(matches!(frame, OutboundFrame::Unsubscribe { .. }));
        assert!(!fx.aggregator.untrack_symbol("BTC/USD"));
    }

    #[tokio::test]
    async fn primary_updates_land_in_the_quote_book() {
        let fx = fixture();

        fx.aggregator.apply_primary_update("BTC/USD", &update(65000));

        assert_eq!(
            fx.quotes.current_price("BTC/USD"),
            Some(Decimal::from(65000))
        );
        assert_eq!(fx.quotes.source("BTC/USD"), Some(QuoteSource::Primary));
    }

    #[tokio::test]
    async fn fired_alert_produces_one_notification() {
        let fx = fixture();
        fx.alerts
            .create_alert("BTC/USD", Decimal::from(60000), AlertCondition::Above);

        fx.aggregator.apply_primary_update("BTC/USD", &update(65000));

        assert_eq!(fx.notifications.unread_count(), 1);
        let delivered = fx.sink.delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].0.message.contains("rose above"));
    }

    #[tokio::test]
    async fn alerts_fire_once_across_repeated_updates() {
        let fx = fixture();
        fx.alerts
            .create_alert("BTC/USD", Decimal::from(60000), AlertCondition::Above);

        fx.aggregator.apply_primary_update("BTC/USD", &update(65000));
        fx.aggregator.apply_primary_update("BTC/USD", &update(66000));

        assert_eq!(fx.notifications.unread_count(), 1);
        assert_eq!(fx.sink.delivered.lock().len(), 1);
    }

    #[tokio::test]
    async fn both_directions_can_fire_on_one_update() {
        let fx = fixture();
        fx.alerts
            .create_alert("APT/USD", Decimal::from(100), AlertCondition::Above);
        fx.alerts
            .create_alert("APT/USD", Decimal::from(120), AlertCondition::Below);

        fx.aggregator.apply_primary_update("APT/USD", &update(110));

        assert_eq!(fx.notifications.unread_count(), 2);
    }

    #[tokio::test]
    async fn fallback_seeds_only_missing_symbols() {
        let fx = fixture();
        fx.aggregator.track_symbol("BTC/USD");
        fx.aggregator.track_symbol("ETH/USD");

        // BTC already has a primary quote; only ETH should be fetched.
        fx.aggregator.apply_primary_update("BTC/USD", &update(65000));

        let mut fallback = MockFallbackSource::new();
        fallback
            .expect_fetch_prices()
            .withf(|keys| keys == ["ethereum".to_string()])
            .returning(|_| {
                Ok(HashMap::from([(
                    "ethereum".to_string(),
                    Decimal::from(2600),
                )]))
            });

        fx.aggregator.poll_fallback_once(&fallback).await;

        assert_eq!(
            fx.quotes.current_price("ETH/USD"),
            Some(Decimal::from(2600))
        );
        assert_eq!(fx.quotes.source("ETH/USD"), Some(QuoteSource::Fallback));
        assert_eq!(fx.quotes.source("BTC/USD"), Some(QuoteSource::Primary));
    }

    #[tokio::test]
    async fn fallback_never_overrides_primary() {
        let fx = fixture();
        fx.aggregator.track_symbol("BTC/USD");
        fx.aggregator.apply_primary_update("BTC/USD", &update(65000));

        // Nothing is missing, so no fetch should happen at all.
        let fallback = MockFallbackSource::new();
        fx.aggregator.poll_fallback_once(&fallback).await;

        assert_eq!(fx.quotes.source("BTC/USD"), Some(QuoteSource::Primary));
    }

    #[tokio::test]
    async fn fallback_errors_are_swallowed() {
        let fx = fixture();
        fx.aggregator.track_symbol("BTC/USD");

        let mut fallback = MockFallbackSource::new();
        fallback
            .expect_fetch_prices()
            .returning(|_| Err(FallbackError::Network("connection refused".to_string())));

        fx.aggregator.poll_fallback_once(&fallback).await;

        assert_eq!(fx.quotes.current_price("BTC/USD"), None);
    }

    #[tokio::test]
    async fn updates_flow_end_to_end_through_the_multiplexer() {
        let (outbound_tx, _outbound_rx) = mpsc::unbounded_channel();
        let multiplexer = Arc::new(StreamMultiplexer::new(outbound_tx));
        let quotes = Arc::new(QuoteBook::new());
        let aggregator = Arc::new(PriceAggregator::new(
            Arc::clone(&multiplexer),
            Arc::clone(&quotes),
            Arc::new(AlertBook::new()),
            Arc::new(NotificationStore::new()),
            Arc::new(RecordingSink::default()) as Arc<dyn NotificationSink>,
        ));

        aggregator.track_symbol("BTC/USD");
        let feed_id = feed_id_for_symbol("BTC/USD").expect("known symbol");

        multiplexer.handle_event(crate::infrastructure::upstream::FeedEvent::Message(
            FeedMessage::PriceUpdate(PriceUpdateMessage {
                id: feed_id.to_string(),
                price: PricePayload {
                    price: Decimal::from(64000),
                    conf: Decimal::ONE,
                },
            }),
        ));

        // The symbol task runs on the runtime; give it a moment.
        for _ in 0..50 {
            if quotes.current_price("BTC/USD").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(
            quotes.current_price("BTC/USD"),
            Some(Decimal::from(64000))
        );
    }
}
