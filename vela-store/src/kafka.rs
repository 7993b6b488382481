use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

use vela_core::bus::{BusError, EventBus};

/// Kafka binding for the event bus; one topic per logical channel.
#[derive(Clone)]
pub struct KafkaEventBus {
    producer: FutureProducer,
}

impl KafkaEventBus {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    async fn publish(&self, channel: &str, key: &str, payload: &str) -> Result<(), BusError> {
        let record = FutureRecord::to(channel).key(key).payload(payload);

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(0)))
            .await
        {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    channel, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", channel, e);
                Err(BusError::Unavailable(e.to_string()))
            }
        }
    }
}
