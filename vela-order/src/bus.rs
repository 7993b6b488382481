use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use vela_core::bus::{channels, BusError, EventBus};
use vela_core::error::HandlerError;
use vela_core::events::OrderEvent;

use crate::retry::{run_with_retry, RetryOutcome, RetryPolicy};

/// Something a channel consumer can hand a decoded event to.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: OrderEvent) -> Result<(), HandlerError>;
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub key: String,
    pub payload: String,
}

/// In-process event bus: one unbounded queue per channel. Used by tests and
/// broker-less deployments; deliveries to channels nobody subscribed to are
/// dropped, like a broker topic with no consumer group.
#[derive(Default)]
pub struct InProcessBus {
    channels: Mutex<HashMap<String, mpsc::UnboundedSender<Delivery>>>,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, channel: &str) -> mpsc::UnboundedReceiver<Delivery> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels
            .lock()
            .expect("bus channel table poisoned")
            .insert(channel.to_string(), tx);
        rx
    }
}

#[async_trait]
impl EventBus for InProcessBus {
    async fn publish(&self, channel: &str, key: &str, payload: &str) -> Result<(), BusError> {
        let sender = {
            let table = self.channels.lock().expect("bus channel table poisoned");
            table.get(channel).cloned()
        };

        match sender {
            Some(tx) => {
                if tx
                    .send(Delivery {
                        key: key.to_string(),
                        payload: payload.to_string(),
                    })
                    .is_err()
                {
                    warn!("consumer for {} went away, dropping delivery", channel);
                }
                Ok(())
            }
            None => {
                debug!("no consumer on {}, dropping delivery", channel);
                Ok(())
            }
        }
    }
}

/// Decode and handle one delivery: bounded retry for transient failures,
/// permanent failures logged and dropped, exhausted deliveries routed to the
/// dead-letter channel.
pub async fn process_delivery(
    handler: &Arc<dyn EventHandler>,
    retry: &RetryPolicy,
    bus: &Arc<dyn EventBus>,
    channel: &str,
    key: &str,
    payload: &str,
) {
    let event: OrderEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => {
            error!("undecodable delivery on {}: {}", channel, e);
            dead_letter(bus, channel, key, payload).await;
            return;
        }
    };

    let outcome = run_with_retry(retry, HandlerError::is_transient, || {
        handler.handle(event.clone())
    })
    .await;

    match outcome {
        RetryOutcome::Ok(()) => {}
        RetryOutcome::Aborted(e) => {
            // Not worth redelivering: a missing order or an interrupted
            // payment wait stays failed however often we try.
            warn!(
                "{} dropped event {} for order {}: {}",
                handler.name(),
                event.header.event_id,
                event.header.order_id,
                e
            );
        }
        RetryOutcome::Exhausted(e) => {
            error!(
                "{} exhausted retries for event {} (order {}): {}, dead-lettering",
                handler.name(),
                event.header.event_id,
                event.header.order_id,
                e
            );
            dead_letter(bus, channel, key, payload).await;
        }
    }
}

async fn dead_letter(bus: &Arc<dyn EventBus>, origin: &str, key: &str, payload: &str) {
    if let Err(e) = bus.publish(channels::DEAD_LETTER, key, payload).await {
        error!("failed to dead-letter delivery from {}: {}", origin, e);
    }
}

/// Drain one channel, handling each delivery on its own task so distinct
/// orders are processed concurrently.
pub fn spawn_consumer(
    channel: &'static str,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
    handler: Arc<dyn EventHandler>,
    retry: RetryPolicy,
    bus: Arc<dyn EventBus>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("consumer started, listening on {}...", channel);
        while let Some(delivery) = rx.recv().await {
            let handler = handler.clone();
            let retry = retry.clone();
            let bus = bus.clone();
            tokio::spawn(async move {
                process_delivery(&handler, &retry, &bus, channel, &delivery.key, &delivery.payload)
                    .await;
            });
        }
    })
}
