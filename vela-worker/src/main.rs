mod worker;

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vela_core::bus::{channels, EventBus};
use vela_core::notification::NotificationStore;
use vela_core::payment::PaymentGateway;
use vela_core::store::{OrderStore, OutboxStore};
use vela_order::bus::EventHandler;
use vela_order::{
    ExpirationScheduler, ExpirationSweeper, LogNotificationGateway, NotificationRecorder,
    OrderCompletedHandler, OrderCreatedHandler, OrderExpiredHandler, OutboxRelay, RetryPolicy,
    SimulatedPaymentGateway,
};
use vela_store::{Config, KafkaEventBus, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vela_worker=debug,vela_order=debug,vela_store=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting Vela order processor");

    let store = Arc::new(PgStore::connect(&config.database.url).await?);
    store.run_migrations().await?;

    let bus: Arc<dyn EventBus> = Arc::new(KafkaEventBus::new(&config.kafka.brokers)?);

    let order_store: Arc<dyn OrderStore> = store.clone();
    let outbox_store: Arc<dyn OutboxStore> = store.clone();
    let notification_store: Arc<dyn NotificationStore> = store.clone();

    // Outbox relay: publishes committed events, exactly one in flight per
    // entry because this is the only drainer.
    let relay = OutboxRelay::new(
        outbox_store,
        bus.clone(),
        config.outbox.poll_interval(),
        config.outbox.batch_size,
        config.outbox.max_attempts,
    );
    tokio::spawn(relay.run());

    // Expiration scheduler on its own timer, independent of the consumers.
    let sweeper = Arc::new(ExpirationSweeper::new(
        order_store.clone(),
        config.lifecycle.expiration_minutes,
    ));
    let scheduler = ExpirationScheduler::new(
        sweeper,
        config.lifecycle.sweep_initial_delay(),
        config.lifecycle.sweep_interval(),
    );
    tokio::spawn(scheduler.run());

    // Lifecycle handlers behind their channel consumers.
    let gateway: Arc<dyn PaymentGateway> = Arc::new(SimulatedPaymentGateway::new(
        config.lifecycle.payment_latency(),
        config.lifecycle.payment_success_probability,
    ));
    let created: Arc<dyn EventHandler> =
        Arc::new(OrderCreatedHandler::new(order_store, gateway));

    let recorder = Arc::new(NotificationRecorder::new(
        notification_store,
        Arc::new(LogNotificationGateway),
    ));
    let completed: Arc<dyn EventHandler> = Arc::new(OrderCompletedHandler::new(recorder.clone()));
    let expired: Arc<dyn EventHandler> = Arc::new(OrderExpiredHandler::new(recorder));

    let retry = RetryPolicy {
        max_attempts: config.consumer.retry_max_attempts,
        initial_backoff: Duration::from_millis(config.consumer.retry_initial_backoff_ms),
        max_backoff: Duration::from_millis(config.consumer.retry_max_backoff_ms),
        multiplier: 2.0,
    };

    for (channel, handler) in [
        (channels::ORDER_CREATED, created),
        (channels::ORDER_COMPLETED, completed),
        (channels::ORDER_EXPIRED, expired),
    ] {
        tokio::spawn(worker::start_channel_consumer(
            config.kafka.brokers.clone(),
            config.consumer.group_id.clone(),
            channel,
            handler,
            retry.clone(),
            bus.clone(),
        ));
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}
