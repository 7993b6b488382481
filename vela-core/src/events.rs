use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::channels;
use crate::models::{Order, OrderItem, OrderStatus};

/// Fields shared by every order lifecycle event. Populated once at
/// construction; events are never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventHeader {
    pub event_id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub total: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl EventHeader {
    fn for_order(order: &Order) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            order_id: order.id,
            user_id: order.user_id,
            total: order.total,
            timestamp: Utc::now(),
        }
    }
}

/// Event payload, discriminated by kind. Consumers dispatch by matching on
/// the tag, one broker channel per kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    Created {
        status: OrderStatus,
        items: Vec<EventItem>,
    },
    Completed {
        completed_at: DateTime<Utc>,
        payment_reference: String,
    },
    Expired {
        previous_status: OrderStatus,
        expired_at: DateTime<Utc>,
        reason: String,
    },
}

/// Item snapshot carried inside `Created` payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventItem {
    pub product_id: Uuid,
    pub quantity: u32,
    pub price: Decimal,
}

impl From<&OrderItem> for EventItem {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
        }
    }
}

/// Immutable record of an order state change, published once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub header: EventHeader,
    pub payload: EventPayload,
}

impl OrderEvent {
    pub fn created(order: &Order) -> Self {
        Self {
            header: EventHeader::for_order(order),
            payload: EventPayload::Created {
                status: order.status,
                items: order.items.iter().map(EventItem::from).collect(),
            },
        }
    }

    pub fn completed(
        order: &Order,
        completed_at: DateTime<Utc>,
        payment_reference: String,
    ) -> Self {
        Self {
            header: EventHeader::for_order(order),
            payload: EventPayload::Completed {
                completed_at,
                payment_reference,
            },
        }
    }

    pub fn expired(
        order: &Order,
        previous_status: OrderStatus,
        expired_at: DateTime<Utc>,
        reason: String,
    ) -> Self {
        Self {
            header: EventHeader::for_order(order),
            payload: EventPayload::Expired {
                previous_status,
                expired_at,
                reason,
            },
        }
    }

    /// The broker channel this event is delivered on.
    pub fn channel(&self) -> &'static str {
        match self.payload {
            EventPayload::Created { .. } => channels::ORDER_CREATED,
            EventPayload::Completed { .. } => channels::ORDER_COMPLETED,
            EventPayload::Expired { .. } => channels::ORDER_EXPIRED,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self.payload {
            EventPayload::Created { .. } => "OrderCreated",
            EventPayload::Completed { .. } => "OrderCompleted",
            EventPayload::Expired { .. } => "OrderExpired",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_order() -> Order {
        let mut order = Order::new(Uuid::new_v4());
        order.set_items(vec![OrderItem::new(
            order.id,
            Uuid::new_v4(),
            3,
            dec!(9.99),
        )]);
        order
    }

    #[test]
    fn test_header_snapshots_order() {
        let order = sample_order();
        let event = OrderEvent::created(&order);

        assert_eq!(event.header.order_id, order.id);
        assert_eq!(event.header.user_id, order.user_id);
        assert_eq!(event.header.total, dec!(29.97));
    }

    #[test]
    fn test_event_ids_are_unique() {
        let order = sample_order();
        let a = OrderEvent::created(&order);
        let b = OrderEvent::created(&order);
        assert_ne!(a.header.event_id, b.header.event_id);
    }

    #[test]
    fn test_channel_per_kind() {
        let order = sample_order();
        assert_eq!(OrderEvent::created(&order).channel(), "order-created");
        assert_eq!(
            OrderEvent::completed(&order, Utc::now(), "PAY-x".into()).channel(),
            "order-completed"
        );
        assert_eq!(
            OrderEvent::expired(&order, OrderStatus::Pending, Utc::now(), "stale".into())
                .channel(),
            "order-expired"
        );
    }

    #[test]
    fn test_payload_is_tag_discriminated() {
        let order = sample_order();
        let event = OrderEvent::completed(&order, Utc::now(), "PAY-123".into());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["payload"]["type"], "Completed");
        assert_eq!(json["payload"]["data"]["payment_reference"], "PAY-123");
    }
}
