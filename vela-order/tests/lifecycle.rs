//! End-to-end lifecycle runs over the in-memory store and in-process bus:
//! order command -> outbox relay -> channel consumers -> notifications.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal_macros::dec;
use uuid::Uuid;

use vela_core::bus::{channels, EventBus};
use vela_core::models::OrderStatus;
use vela_core::notification::{NotificationEventType, NotificationStatus};
use vela_core::payment::PaymentGateway;
use vela_core::store::{OrderStore, OutboxStatus};
use vela_order::bus::{spawn_consumer, EventHandler, InProcessBus};
use vela_order::service::NewOrderItem;
use vela_order::{
    ExpirationSweeper, NotificationRecorder, OrderCompletedHandler, OrderCreatedHandler,
    OrderExpiredHandler, OrderService, OutboxRelay, RetryPolicy, SimulatedPaymentGateway,
};
use vela_store::MemoryStore;

struct Harness {
    store: MemoryStore,
    bus: Arc<InProcessBus>,
    service: OrderService,
    relay: OutboxRelay,
}

/// Wire the full processor over in-memory infrastructure. The payment
/// probability is pinned so outcomes are deterministic.
fn harness(success_probability: f64) -> Harness {
    let store = MemoryStore::new();
    let bus_impl = Arc::new(InProcessBus::new());
    let bus: Arc<dyn EventBus> = bus_impl.clone();

    let order_store: Arc<dyn OrderStore> = Arc::new(store.clone());
    let gateway: Arc<dyn PaymentGateway> = Arc::new(SimulatedPaymentGateway::new(
        Duration::ZERO,
        success_probability,
    ));
    let retry = RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(10),
        multiplier: 2.0,
    };

    let created: Arc<dyn EventHandler> = Arc::new(OrderCreatedHandler::new(
        order_store.clone(),
        gateway,
    ));
    let recorder = Arc::new(NotificationRecorder::new(
        Arc::new(store.clone()),
        Arc::new(vela_order::LogNotificationGateway),
    ));
    let completed: Arc<dyn EventHandler> = Arc::new(OrderCompletedHandler::new(recorder.clone()));
    let expired: Arc<dyn EventHandler> = Arc::new(OrderExpiredHandler::new(recorder));

    for (channel, handler) in [
        (channels::ORDER_CREATED, created),
        (channels::ORDER_COMPLETED, completed),
        (channels::ORDER_EXPIRED, expired),
    ] {
        let rx = bus_impl.subscribe(channel);
        spawn_consumer(channel, rx, handler, retry.clone(), bus.clone());
    }

    let relay = OutboxRelay::new(
        Arc::new(store.clone()),
        bus.clone(),
        Duration::from_millis(5),
        50,
        5,
    );

    Harness {
        service: OrderService::new(order_store),
        store,
        bus: bus_impl,
        relay,
    }
}

fn two_item_order() -> Vec<NewOrderItem> {
    vec![
        NewOrderItem {
            product_id: Uuid::new_v4(),
            quantity: 1,
            price: dec!(25.00),
        },
        NewOrderItem {
            product_id: Uuid::new_v4(),
            quantity: 1,
            price: dec!(25.00),
        },
    ]
}

/// Poll the store until the order reaches `expected` or the deadline passes.
async fn wait_for_status(store: &MemoryStore, id: Uuid, expected: OrderStatus) {
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(order) = store.load(id).await.unwrap() {
                if order.status == expected {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "order {} never reached {:?}", id, expected);
}

async fn wait_for_notifications(store: &MemoryStore, count: usize) {
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if store.notifications().await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "expected {} notification rows", count);
}

async fn wait_for_outbox_sent(store: &MemoryStore, count: usize) {
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let entries = store.outbox_entries().await;
            if entries.len() >= count && entries.iter().all(|e| e.status == OutboxStatus::Sent) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "expected {} sent outbox entries", count);
}

/// Keep draining the outbox in the background for the duration of a test.
fn spawn_relay(relay: OutboxRelay) {
    tokio::spawn(relay.run());
}

#[tokio::test]
async fn test_order_completes_end_to_end() {
    let h = harness(1.0);
    spawn_relay(h.relay);

    let order = h
        .service
        .create_order(Uuid::new_v4(), two_item_order(), Some(dec!(10.00)))
        .await
        .unwrap();

    // The conflicting caller-supplied total lost against the items.
    assert_eq!(order.total, dec!(50.00));

    wait_for_status(&h.store, order.id, OrderStatus::Completed).await;
    wait_for_notifications(&h.store, 1).await;

    let rows = h.store.notifications().await;
    assert_eq!(rows[0].event_type, NotificationEventType::OrderCompleted);
    assert_eq!(rows[0].status, NotificationStatus::Sent);
    assert_eq!(rows[0].order_id, order.id);
    assert!(rows[0].message.contains("$50.00"));

    // Both lifecycle events went through the outbox and were marked sent.
    wait_for_outbox_sent(&h.store, 2).await;
    let outbox = h.store.outbox_entries().await;
    assert_eq!(outbox.len(), 2);
    let channels_seen: Vec<&str> = outbox.iter().map(|e| e.channel.as_str()).collect();
    assert!(channels_seen.contains(&"order-created"));
    assert!(channels_seen.contains(&"order-completed"));
}

#[tokio::test]
async fn test_declined_payment_parks_order_in_processing() {
    let h = harness(0.0);
    spawn_relay(h.relay);

    let order = h
        .service
        .create_order(Uuid::new_v4(), two_item_order(), None)
        .await
        .unwrap();

    wait_for_status(&h.store, order.id, OrderStatus::Processing).await;

    // Give the pipeline a moment: no completion, no notification may appear.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let loaded = h.store.load(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OrderStatus::Processing);
    assert!(h.store.notifications().await.is_empty());

    let outbox = h.store.outbox_entries().await;
    assert_eq!(outbox.len(), 1, "only the created event exists");
    assert_eq!(outbox[0].channel, "order-created");
}

#[tokio::test]
async fn test_stalled_order_expires_end_to_end() {
    let h = harness(0.0);

    // Park an order in PROCESSING, then age it past the threshold.
    let order = h
        .service
        .create_order(Uuid::new_v4(), two_item_order(), None)
        .await
        .unwrap();
    spawn_relay(h.relay);
    wait_for_status(&h.store, order.id, OrderStatus::Processing).await;

    let mut aged = h.store.load(order.id).await.unwrap().unwrap();
    aged.created_at = Utc::now() - chrono::Duration::minutes(11);
    h.store.save(&aged, &[]).await.unwrap();

    let sweeper = ExpirationSweeper::new(Arc::new(h.store.clone()), 10);
    assert_eq!(sweeper.sweep().await.unwrap(), 1);

    wait_for_status(&h.store, order.id, OrderStatus::Expired).await;
    wait_for_notifications(&h.store, 1).await;

    let rows = h.store.notifications().await;
    assert_eq!(rows[0].event_type, NotificationEventType::OrderExpired);
    assert_eq!(rows[0].status, NotificationStatus::Pending);
    assert!(rows[0].message.contains("Previous status: PROCESSING"));

    // Exactly one expiration event, and the terminal state sticks: another
    // sweep finds nothing.
    assert_eq!(sweeper.sweep().await.unwrap(), 0);
    let expired_events: Vec<_> = h
        .store
        .outbox_entries()
        .await
        .into_iter()
        .filter(|e| e.channel == "order-expired")
        .collect();
    assert_eq!(expired_events.len(), 1);
}

#[tokio::test]
async fn test_rolled_back_creation_publishes_nothing() {
    let h = harness(1.0);

    h.store.fail_writes(true);
    let result = h
        .service
        .create_order(Uuid::new_v4(), two_item_order(), None)
        .await;
    h.store.fail_writes(false);
    assert!(result.is_err());

    // Nothing committed means nothing for the relay to publish.
    assert!(h.store.outbox_entries().await.is_empty());
    assert_eq!(h.relay.drain_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_redelivered_created_event_is_idempotent() {
    let h = harness(1.0);
    spawn_relay(h.relay);

    let order = h
        .service
        .create_order(Uuid::new_v4(), two_item_order(), None)
        .await
        .unwrap();
    wait_for_status(&h.store, order.id, OrderStatus::Completed).await;

    // Redeliver the created event straight onto the channel.
    let created_payload = h
        .store
        .outbox_entries()
        .await
        .into_iter()
        .find(|e| e.channel == "order-created")
        .unwrap()
        .payload;
    h.bus
        .publish(channels::ORDER_CREATED, &order.id.to_string(), &created_payload)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    // Still exactly one completion event and one notification.
    let completed_events: Vec<_> = h
        .store
        .outbox_entries()
        .await
        .into_iter()
        .filter(|e| e.channel == "order-completed")
        .collect();
    assert_eq!(completed_events.len(), 1);

    wait_for_notifications(&h.store, 1).await;
    assert_eq!(h.store.notifications().await.len(), 1);
}
