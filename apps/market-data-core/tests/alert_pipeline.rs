//! Alert Pipeline Integration Tests
//!
//! Drives price updates through the event pump, multiplexer, and aggregator
//! and verifies quotes, one-shot alert firing, and notification delivery.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use market_data_core::infrastructure::upstream::{
    PricePayload, PriceUpdateMessage, feed_id_for_symbol,
};
use market_data_core::{
    AlertBook, AlertCondition, DeliveryDecision, FeedEvent, FeedMessage, Notification,
    NotificationSink, NotificationStore, PreferencesUpdate, PriceAggregator, QuoteBook,
    QuoteSource, StreamMultiplexer,
};

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

struct Pipeline {
    aggregator: Arc<PriceAggregator>,
    quotes: Arc<QuoteBook>,
    alerts: Arc<AlertBook>,
    notifications: Arc<NotificationStore>,
    sink: Arc<RecordingSink>,
    event_tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
}

impl Pipeline {
    async fn push_update(&self, symbol: &str, price: i64) {
        let feed_id = feed_id_for_symbol(symbol).expect("known symbol");
        self.event_tx
            .send(FeedEvent::Message(FeedMessage::PriceUpdate(
                PriceUpdateMessage {
                    id: feed_id.to_string(),
                    price: PricePayload {
                        price: Decimal::from(price),
                        conf: Decimal::ONE,
                    },
                },
            )))
            .await
            .unwrap();
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn pipeline() -> Pipeline {
    let (outbound_tx, _outbound_rx) = mpsc::unbounded_channel();
    let multiplexer = Arc::new(StreamMultiplexer::new(outbound_tx));

    let (event_tx, event_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    tokio::spawn(Arc::clone(&multiplexer).pump(event_rx, cancel.clone()));

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

    Pipeline {
        aggregator,
        quotes,
        alerts,
        notifications,
        sink,
        event_tx,
        cancel,
    }
}

/// Poll until `condition` holds or two seconds pass.
async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn streamed_updates_reach_the_quote_book() {
    let pipe = pipeline();
    pipe.aggregator.track_symbol("BTC/USD");

    pipe.push_update("BTC/USD", 64000).await;

    let quotes = Arc::clone(&pipe.quotes);
    wait_for(move || quotes.current_price("BTC/USD").is_some()).await;

    assert_eq!(
        pipe.quotes.current_price("BTC/USD"),
        Some(Decimal::from(64000))
    );
    assert_eq!(pipe.quotes.source("BTC/USD"), Some(QuoteSource::Primary));
}

#[tokio::test]
async fn symbols_route_independently() {
    let pipe = pipeline();
    pipe.aggregator.track_symbol("BTC/USD");
    pipe.aggregator.track_symbol("ETH/USD");

    pipe.push_update("ETH/USD", 2600).await;

    let quotes = Arc::clone(&pipe.quotes);
    wait_for(move || quotes.current_price("ETH/USD").is_some()).await;

    assert_eq!(
        pipe.quotes.current_price("ETH/USD"),
        Some(Decimal::from(2600))
    );
    assert_eq!(pipe.quotes.current_price("BTC/USD"), None);
}

#[tokio::test]
async fn alert_fires_once_through_the_full_pipeline() {
    let pipe = pipeline();
    pipe.aggregator.track_symbol("BTC/USD");
    pipe.alerts
        .create_alert("BTC/USD", Decimal::from(60000), AlertCondition::Above);

    // Two crossing updates; the alert is one-shot.
    pipe.push_update("BTC/USD", 65000).await;
    pipe.push_update("BTC/USD", 66000).await;

    let quotes = Arc::clone(&pipe.quotes);
    wait_for(move || quotes.current_price("BTC/USD") == Some(Decimal::from(66000))).await;

    assert_eq!(pipe.notifications.unread_count(), 1);
    let delivered = pipe.sink.delivered.lock();
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0].0.message.contains("rose above"));
    drop(delivered);

    let alert = &pipe.alerts.alerts()[0];
    assert!(!alert.is_active);
    assert!(alert.triggered_at.is_some());
}

#[tokio::test]
async fn disabled_preferences_suppress_delivery_but_keep_the_record() {
    let pipe = pipeline();
    pipe.aggregator.track_symbol("BTC/USD");
    pipe.notifications.update_preferences(PreferencesUpdate {
        enable_sound: Some(false),
        enable_desktop: Some(false),
        ..Default::default()
    });
    pipe.alerts
        .create_alert("BTC/USD", Decimal::from(60000), AlertCondition::Above);

    pipe.push_update("BTC/USD", 65000).await;

    let notifications = Arc::clone(&pipe.notifications);
    wait_for(move || notifications.unread_count() == 1).await;

    let delivered = pipe.sink.delivered.lock();
    assert_eq!(delivered.len(), 1);
    assert!(!delivered[0].1.any());
}

#[tokio::test]
async fn below_alert_fires_on_a_falling_price() {
    let pipe = pipeline();
    pipe.aggregator.track_symbol("APT/USD");
    pipe.alerts
        .create_alert("APT/USD", Decimal::from(5), AlertCondition::Below);

    pipe.push_update("APT/USD", 4).await;

    let notifications = Arc::clone(&pipe.notifications);
    wait_for(move || notifications.unread_count() == 1).await;

    let delivered = pipe.sink.delivered.lock();
    assert!(delivered[0].0.message.contains("fell below"));
}
