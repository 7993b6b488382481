use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use vela_core::events::OrderEvent;
use vela_core::models::{Order, OrderItem};
use vela_core::store::{OrderStore, StoreError};

/// Line requested by the caller; ids and timestamps are assigned here.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub quantity: u32,
    pub price: Decimal,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: Uuid, quantity: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Entry point for order commands. Creation persists the PENDING order and
/// raises `OrderCreated` in the same transaction, so the event is published
/// only after the order is durably committed.
pub struct OrderService {
    store: Arc<dyn OrderStore>,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub async fn create_order(
        &self,
        user_id: Uuid,
        items: Vec<NewOrderItem>,
        total: Option<Decimal>,
    ) -> Result<Order, ServiceError> {
        validate_items(&items)?;

        let mut order = Order::new(user_id);
        if items.is_empty() {
            if let Some(total) = total {
                order.total = total;
            }
        } else {
            // Items win over any caller-supplied total.
            order.set_items(build_items(order.id, items));
        }

        let event = OrderEvent::created(&order);
        let saved = self.store.save(&order, &[event]).await?;
        info!("Order {} created with total {}", saved.id, saved.total);
        Ok(saved)
    }

    pub async fn update_order(
        &self,
        id: Uuid,
        items: Option<Vec<NewOrderItem>>,
        total: Option<Decimal>,
    ) -> Result<Order, ServiceError> {
        let mut order = self
            .store
            .load(id)
            .await?
            .ok_or(ServiceError::NotFound(id))?;

        match items {
            Some(items) if !items.is_empty() => {
                validate_items(&items)?;
                order.set_items(build_items(order.id, items));
            }
            _ => {
                if let Some(total) = total {
                    order.total = total;
                    order.updated_at = chrono::Utc::now();
                }
            }
        }

        Ok(self.store.save(&order, &[]).await?)
    }
}

fn validate_items(items: &[NewOrderItem]) -> Result<(), ServiceError> {
    for item in items {
        if item.quantity < 1 {
            return Err(ServiceError::InvalidQuantity {
                product_id: item.product_id,
                quantity: item.quantity,
            });
        }
    }
    Ok(())
}

fn build_items(order_id: Uuid, items: Vec<NewOrderItem>) -> Vec<OrderItem> {
    items
        .into_iter()
        .map(|item| OrderItem::new(order_id, item.product_id, item.quantity, item.price))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vela_core::models::OrderStatus;
    use vela_store::MemoryStore;

    fn service_over(store: &MemoryStore) -> OrderService {
        OrderService::new(Arc::new(store.clone()))
    }

    fn item(price: Decimal, quantity: u32) -> NewOrderItem {
        NewOrderItem {
            product_id: Uuid::new_v4(),
            quantity,
            price,
        }
    }

    #[tokio::test]
    async fn test_items_override_supplied_total() {
        let store = MemoryStore::new();
        let service = service_over(&store);

        let order = service
            .create_order(
                Uuid::new_v4(),
                vec![item(dec!(25.00), 1), item(dec!(25.00), 1)],
                Some(dec!(10.00)),
            )
            .await
            .unwrap();

        assert_eq!(order.total, dec!(50.00));
        assert_eq!(order.status, OrderStatus::Pending);

        let stored = store.load(order.id).await.unwrap().unwrap();
        assert_eq!(stored.total, dec!(50.00));
    }

    #[tokio::test]
    async fn test_supplied_total_kept_without_items() {
        let store = MemoryStore::new();
        let service = service_over(&store);

        let order = service
            .create_order(Uuid::new_v4(), vec![], Some(dec!(99.90)))
            .await
            .unwrap();

        assert_eq!(order.total, dec!(99.90));
        assert!(order.items.is_empty());
    }

    #[tokio::test]
    async fn test_create_raises_created_event_in_same_write() {
        let store = MemoryStore::new();
        let service = service_over(&store);

        let order = service
            .create_order(Uuid::new_v4(), vec![item(dec!(5.00), 2)], None)
            .await
            .unwrap();

        let outbox = store.outbox_entries().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].channel, "order-created");
        assert_eq!(outbox[0].order_id, order.id);
    }

    #[tokio::test]
    async fn test_failed_persistence_raises_nothing() {
        let store = MemoryStore::new();
        let service = service_over(&store);

        store.fail_writes(true);
        let result = service
            .create_order(Uuid::new_v4(), vec![item(dec!(5.00), 1)], None)
            .await;
        store.fail_writes(false);

        assert!(result.is_err());
        assert!(store.outbox_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let store = MemoryStore::new();
        let service = service_over(&store);

        let result = service
            .create_order(Uuid::new_v4(), vec![item(dec!(5.00), 0)], None)
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::InvalidQuantity { quantity: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_update_recomputes_total_from_new_items() {
        let store = MemoryStore::new();
        let service = service_over(&store);

        let order = service
            .create_order(Uuid::new_v4(), vec![item(dec!(25.00), 2)], None)
            .await
            .unwrap();

        let updated = service
            .update_order(
                order.id,
                Some(vec![item(dec!(7.50), 2)]),
                Some(dec!(1.00)),
            )
            .await
            .unwrap();

        assert_eq!(updated.total, dec!(15.00));
        assert_eq!(updated.items.len(), 1);
    }

    #[tokio::test]
    async fn test_update_total_only_without_items() {
        let store = MemoryStore::new();
        let service = service_over(&store);

        let order = service
            .create_order(Uuid::new_v4(), vec![], Some(dec!(20.00)))
            .await
            .unwrap();

        let updated = service
            .update_order(order.id, None, Some(dec!(30.00)))
            .await
            .unwrap();

        assert_eq!(updated.total, dec!(30.00));
    }

    #[tokio::test]
    async fn test_update_missing_order() {
        let store = MemoryStore::new();
        let service = service_over(&store);

        let result = service.update_order(Uuid::new_v4(), None, None).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }
}
