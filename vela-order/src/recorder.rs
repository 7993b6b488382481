use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use vela_core::error::HandlerError;
use vela_core::events::{EventPayload, OrderEvent};
use vela_core::models::OrderStatus;
use vela_core::notification::{
    Notification, NotificationChannel, NotificationEventType, NotificationGateway,
    NotificationStatus, NotificationStore,
};

/// Mock outward channel: writes the message to the log instead of sending.
pub struct LogNotificationGateway;

#[async_trait]
impl NotificationGateway for LogNotificationGateway {
    async fn send(
        &self,
        user_id: Uuid,
        subject: &str,
        body: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("SENDING EMAIL NOTIFICATION");
        info!("To: user {}", user_id);
        info!("Subject: {}", subject);
        info!("Body: {}", body);
        Ok(())
    }
}

/// Maps event payloads to human-readable messages and persists a
/// Notification row per handled event. There is no dedup key: a redelivered
/// event produces a second row.
pub struct NotificationRecorder {
    store: Arc<dyn NotificationStore>,
    gateway: Arc<dyn NotificationGateway>,
}

impl NotificationRecorder {
    pub fn new(store: Arc<dyn NotificationStore>, gateway: Arc<dyn NotificationGateway>) -> Self {
        Self { store, gateway }
    }

    /// Outward send first, then the row; the two are not atomic. A crash in
    /// between yields a dispatched notification with no record, or vice
    /// versa.
    pub async fn record_completed(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        total: Decimal,
        completed_at: DateTime<Utc>,
        payment_reference: &str,
    ) -> Result<(), HandlerError> {
        let subject = format!("Your Order #{} has been Completed!", order_id);
        let message = format!(
            "Your order #{} has been successfully completed! Total: ${}. Payment Reference: {}",
            order_id, total, payment_reference
        );

        self.gateway
            .send(user_id, &subject, &message)
            .await
            .map_err(|e| HandlerError::Notify(e.to_string()))?;
        info!(
            "Completion email dispatched for order {} (completed at {})",
            order_id, completed_at
        );

        let notification = Notification::new(
            order_id,
            user_id,
            NotificationEventType::OrderCompleted,
            message,
            NotificationChannel::Email,
            NotificationStatus::Sent,
        );
        self.store.save(&notification).await?;
        info!("Notification saved for order {}", order_id);
        Ok(())
    }

    pub async fn record_expired(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        previous_status: OrderStatus,
        reason: &str,
    ) -> Result<(), HandlerError> {
        let message = format!(
            "Your order #{} has expired. Previous status: {}. Reason: {}",
            order_id, previous_status, reason
        );

        let notification = Notification::new(
            order_id,
            user_id,
            NotificationEventType::OrderExpired,
            message,
            NotificationChannel::Email,
            NotificationStatus::Pending,
        );
        self.store.save(&notification).await?;
        info!("Expiration notification saved for order {}", order_id);
        Ok(())
    }
}

/// Consumes `OrderCompleted` and records/sends the completion notification.
pub struct OrderCompletedHandler {
    recorder: Arc<NotificationRecorder>,
}

impl OrderCompletedHandler {
    pub fn new(recorder: Arc<NotificationRecorder>) -> Self {
        Self { recorder }
    }
}

#[async_trait]
impl crate::bus::EventHandler for OrderCompletedHandler {
    fn name(&self) -> &'static str {
        "order-completed-handler"
    }

    async fn handle(&self, event: OrderEvent) -> Result<(), HandlerError> {
        info!(
            "Processing OrderCompleted for order {}, event {}",
            event.header.order_id, event.header.event_id
        );

        let EventPayload::Completed {
            completed_at,
            ref payment_reference,
        } = event.payload
        else {
            warn!(
                "unexpected payload kind {} on order-completed",
                event.event_type()
            );
            return Err(HandlerError::Payload(format!(
                "expected Completed, got {}",
                event.event_type()
            )));
        };

        self.recorder
            .record_completed(
                event.header.order_id,
                event.header.user_id,
                event.header.total,
                completed_at,
                payment_reference,
            )
            .await
    }
}

/// Consumes `OrderExpired` and records the expiration notification.
pub struct OrderExpiredHandler {
    recorder: Arc<NotificationRecorder>,
}

impl OrderExpiredHandler {
    pub fn new(recorder: Arc<NotificationRecorder>) -> Self {
        Self { recorder }
    }
}

#[async_trait]
impl crate::bus::EventHandler for OrderExpiredHandler {
    fn name(&self) -> &'static str {
        "order-expired-handler"
    }

    async fn handle(&self, event: OrderEvent) -> Result<(), HandlerError> {
        info!(
            "Processing OrderExpired for order {}, event {}",
            event.header.order_id, event.header.event_id
        );

        let EventPayload::Expired {
            previous_status,
            ref reason,
            ..
        } = event.payload
        else {
            warn!(
                "unexpected payload kind {} on order-expired",
                event.event_type()
            );
            return Err(HandlerError::Payload(format!(
                "expected Expired, got {}",
                event.event_type()
            )));
        };

        self.recorder
            .record_expired(
                event.header.order_id,
                event.header.user_id,
                previous_status,
                reason,
            )
            .await
    }
}
