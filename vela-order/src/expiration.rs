use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info};

use vela_core::events::OrderEvent;
use vela_core::models::OrderStatus;
use vela_core::store::{OrderStore, StoreError};

/// Force-expires orders stuck in PENDING/PROCESSING past the staleness
/// threshold. Each expiration is a conditional transition carrying its
/// `OrderExpired` event, so an order completed mid-sweep is skipped, never
/// clobbered.
pub struct ExpirationSweeper {
    store: Arc<dyn OrderStore>,
    threshold_minutes: u64,
}

impl ExpirationSweeper {
    pub fn new(store: Arc<dyn OrderStore>, threshold_minutes: u64) -> Self {
        Self {
            store,
            threshold_minutes,
        }
    }

    /// Returns how many orders were expired. A store error aborts the sweep;
    /// progress made before the failure is kept, and everything still stale
    /// is picked up on the next tick.
    pub async fn sweep(&self) -> Result<usize, StoreError> {
        let threshold = Utc::now() - ChronoDuration::minutes(self.threshold_minutes as i64);
        debug!("Checking for orders to expire (older than {})", threshold);

        let stale = self
            .store
            .find_stale_by_status(&[OrderStatus::Pending, OrderStatus::Processing], threshold)
            .await?;

        if stale.is_empty() {
            debug!("No orders to expire");
            return Ok(0);
        }
        info!("Found {} orders to expire", stale.len());

        let mut expired = 0;
        for order in stale {
            let previous_status = order.status;
            let event = OrderEvent::expired(
                &order,
                previous_status,
                Utc::now(),
                format!(
                    "Order not completed within {} minutes",
                    self.threshold_minutes
                ),
            );

            match self
                .store
                .transition(order.id, previous_status, OrderStatus::Expired, &[event])
                .await?
            {
                Some(_) => {
                    info!(
                        "Order {} expired (previous status: {}, created at: {})",
                        order.id, previous_status, order.created_at
                    );
                    expired += 1;
                }
                None => {
                    // The created handler advanced the order between our
                    // query and the write; leave it alone.
                    debug!("Order {} advanced concurrently, skipping", order.id);
                }
            }
        }

        info!("Expired {} orders", expired);
        Ok(expired)
    }
}

/// Periodic driver for the sweeper: first run after `initial_delay`, each
/// following run a fixed `interval` after the previous one finished, so
/// sweeps never overlap. Sweep failures are logged and do not stop the loop.
pub struct ExpirationScheduler {
    sweeper: Arc<ExpirationSweeper>,
    initial_delay: Duration,
    interval: Duration,
}

impl ExpirationScheduler {
    pub fn new(sweeper: Arc<ExpirationSweeper>, initial_delay: Duration, interval: Duration) -> Self {
        Self {
            sweeper,
            initial_delay,
            interval,
        }
    }

    pub async fn run(self) {
        info!(
            "Expiration scheduler started (initial delay {:?}, interval {:?})",
            self.initial_delay, self.interval
        );
        sleep(self.initial_delay).await;

        loop {
            debug!("Running scheduled order expiration check");
            if let Err(e) = self.sweeper.sweep().await {
                error!("Error during scheduled order expiration check: {}", e);
            }
            sleep(self.interval).await;
        }
    }
}
