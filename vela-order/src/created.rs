use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use vela_core::error::HandlerError;
use vela_core::events::OrderEvent;
use vela_core::models::OrderStatus;
use vela_core::payment::{PaymentDecision, PaymentGateway};
use vela_core::store::OrderStore;

use crate::bus::EventHandler;

/// Consumes `OrderCreated`: claims the order PENDING → PROCESSING, runs the
/// external payment step, and on approval completes the order together with
/// its `OrderCompleted` event. A declined payment leaves the order in
/// PROCESSING with no event and no retry; the expiration sweep is the only
/// way out of that state.
pub struct OrderCreatedHandler {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl OrderCreatedHandler {
    pub fn new(store: Arc<dyn OrderStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }
}

#[async_trait]
impl EventHandler for OrderCreatedHandler {
    fn name(&self) -> &'static str {
        "order-created-handler"
    }

    async fn handle(&self, event: OrderEvent) -> Result<(), HandlerError> {
        let order_id = event.header.order_id;
        info!(
            "Processing OrderCreated for order {}, event {}",
            order_id, event.header.event_id
        );

        let order = self
            .store
            .load(order_id)
            .await?
            .ok_or(HandlerError::NotFound(order_id))?;

        // Idempotency guard: a redelivered event finds the order already
        // advanced (or terminal) and must not touch it.
        if order.status != OrderStatus::Pending {
            warn!(
                "Order {} already in status {}, skipping",
                order_id, order.status
            );
            return Ok(());
        }

        // Claim the order before the payment wait so a concurrent
        // redelivery sees PROCESSING, not PENDING. The conditional update
        // means exactly one claimant wins.
        let Some(order) = self
            .store
            .transition(order_id, OrderStatus::Pending, OrderStatus::Processing, &[])
            .await?
        else {
            warn!("Order {} was claimed concurrently, skipping", order_id);
            return Ok(());
        };
        info!("Order {} status updated to PROCESSING", order_id);

        match self.gateway.charge(&order).await? {
            PaymentDecision::Approved => {
                let completed_at = Utc::now();
                let payment_reference = format!("PAY-{}", Uuid::new_v4());
                let event = OrderEvent::completed(&order, completed_at, payment_reference);

                match self
                    .store
                    .transition(
                        order_id,
                        OrderStatus::Processing,
                        OrderStatus::Completed,
                        &[event],
                    )
                    .await?
                {
                    Some(_) => info!(
                        "Payment successful for order {}, status updated to COMPLETED",
                        order_id
                    ),
                    // The sweeper expired the order during the payment wait;
                    // the completion loses and its event is never raised.
                    None => warn!(
                        "Order {} left PROCESSING during payment, dropping completion",
                        order_id
                    ),
                }
            }
            PaymentDecision::Declined => {
                info!(
                    "Payment failed for order {}, status remains PROCESSING",
                    order_id
                );
            }
        }

        Ok(())
    }
}
