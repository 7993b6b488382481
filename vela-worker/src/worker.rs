use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::sync::Arc;
use tracing::{error, info};

use vela_core::bus::EventBus;
use vela_order::bus::{process_delivery, EventHandler};
use vela_order::retry::RetryPolicy;

/// One Kafka consumer per logical channel; each delivery is handled on its
/// own task so distinct orders proceed in parallel.
pub async fn start_channel_consumer(
    brokers: String,
    group_id: String,
    channel: &'static str,
    handler: Arc<dyn EventHandler>,
    retry: RetryPolicy,
    bus: Arc<dyn EventBus>,
) {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("group.id", &group_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "earliest")
        .create()
        .expect("Consumer creation failed");

    consumer.subscribe(&[channel]).expect("Can't subscribe");

    info!("Consumer started, listening on {}...", channel);

    loop {
        match consumer.recv().await {
            Err(e) => error!("Kafka error: {}", e),
            Ok(m) => {
                if let Some(payload) = m.payload_view::<str>() {
                    match payload {
                        Ok(payload) => {
                            let key = m
                                .key()
                                .and_then(|k| std::str::from_utf8(k).ok())
                                .unwrap_or_default()
                                .to_string();
                            let payload = payload.to_string();
                            let handler = handler.clone();
                            let retry = retry.clone();
                            let bus = bus.clone();
                            tokio::spawn(async move {
                                process_delivery(&handler, &retry, &bus, channel, &key, &payload)
                                    .await;
                            });
                        }
                        Err(e) => error!("Error reading payload: {}", e),
                    }
                }
            }
        }
    }
}
