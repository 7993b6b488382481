use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "PROCESSING" => Some(OrderStatus::Processing),
            "COMPLETED" => Some(OrderStatus::Completed),
            "EXPIRED" => Some(OrderStatus::Expired),
            _ => None,
        }
    }

    /// Completed and Expired are terminal; no transition may leave them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Expired)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single source of truth for a customer's purchase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total: Decimal,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            total: Decimal::ZERO,
            status: OrderStatus::Pending,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the item list and recompute the total from it.
    ///
    /// Invariant: whenever items are supplied, `total = Σ(price × quantity)`;
    /// a caller-supplied total is only honored for item-less orders.
    pub fn set_items(&mut self, items: Vec<OrderItem>) {
        self.items = items;
        self.total = self
            .items
            .iter()
            .map(|item| item.price * Decimal::from(item.quantity))
            .sum();
        self.updated_at = Utc::now();
    }

    pub fn update_status(&mut self, new_status: OrderStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }
}

/// An individual product line within an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn new(order_id: Uuid, product_id: Uuid, quantity: u32, price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            quantity,
            price,
            created_at: Utc::now(),
        }
    }
}
