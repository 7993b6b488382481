use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use vela_core::bus::EventBus;
use vela_core::store::{OutboxStore, StoreError};

/// Drains the event outbox: publishes each pending entry to its channel and
/// marks it sent. An entry that keeps failing is dead-lettered after
/// `max_attempts` so a poisoned payload cannot wedge the relay. Runs as a
/// single background task, which is what makes "published once" hold.
pub struct OutboxRelay {
    outbox: Arc<dyn OutboxStore>,
    bus: Arc<dyn EventBus>,
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
}

impl OutboxRelay {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        bus: Arc<dyn EventBus>,
        poll_interval: Duration,
        batch_size: usize,
        max_attempts: u32,
    ) -> Self {
        Self {
            outbox,
            bus,
            poll_interval,
            batch_size,
            max_attempts,
        }
    }

    /// One pass over the pending entries; returns how many were published.
    pub async fn drain_once(&self) -> Result<usize, StoreError> {
        let pending = self.outbox.fetch_pending(self.batch_size).await?;
        if pending.is_empty() {
            return Ok(0);
        }
        debug!("Draining {} pending outbox entries", pending.len());

        let mut published = 0;
        for entry in pending {
            let key = entry.order_id.to_string();
            match self.bus.publish(&entry.channel, &key, &entry.payload).await {
                Ok(()) => {
                    self.outbox.mark_sent(entry.id).await?;
                    published += 1;
                }
                Err(e) => {
                    let attempts = self.outbox.record_failure(entry.id).await?;
                    if attempts >= self.max_attempts {
                        error!(
                            "Dead-lettering outbox entry {} (order {}, channel {}) after {} attempts: {}",
                            entry.id, entry.order_id, entry.channel, attempts, e
                        );
                        self.outbox.mark_dead(entry.id).await?;
                    } else {
                        warn!(
                            "Publish failed for outbox entry {} (attempt {}): {}, will retry",
                            entry.id, attempts, e
                        );
                    }
                }
            }
        }
        Ok(published)
    }

    pub async fn run(self) {
        info!(
            "Outbox relay started (poll interval {:?}, batch size {})",
            self.poll_interval, self.batch_size
        );
        loop {
            if let Err(e) = self.drain_once().await {
                error!("Outbox drain failed: {}", e);
            }
            sleep(self.poll_interval).await;
        }
    }
}
