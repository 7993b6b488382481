use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::events::OrderEvent;
use crate::models::{Order, OrderStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error("event serialization failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persistence interface over order aggregates (order + line items).
///
/// Mutating operations accept the events raised by the mutation and must
/// write them as outbox rows in the same transaction: if the mutation rolls
/// back, the events are never published. `transition` is a conditional
/// update (row lock / compare-and-set) so that concurrent check-then-write
/// sequences against the same order are mutually exclusive.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Upsert the order and append the raised events to the outbox,
    /// atomically.
    async fn save(&self, order: &Order, events: &[OrderEvent]) -> Result<Order, StoreError>;

    /// Set `to` only if the order is currently in `from`, appending the
    /// raised events in the same transaction. Returns the updated order, or
    /// `None` when the guard did not match (another writer got there first).
    async fn transition(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        events: &[OrderEvent],
    ) -> Result<Option<Order>, StoreError>;

    /// Orders in one of `statuses` created strictly before `before`,
    /// oldest first.
    async fn find_stale_by_status(
        &self,
        statuses: &[OrderStatus],
        before: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Sent,
    Dead,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Sent => "SENT",
            OutboxStatus::Dead => "DEAD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OutboxStatus::Pending),
            "SENT" => Some(OutboxStatus::Sent),
            "DEAD" => Some(OutboxStatus::Dead),
            _ => None,
        }
    }
}

/// A raised event persisted alongside its triggering mutation, waiting to be
/// drained to the broker.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub channel: String,
    pub payload: String,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    pub fn for_event(event: &OrderEvent) -> Result<Self, StoreError> {
        Ok(Self {
            id: Uuid::new_v4(),
            order_id: event.header.order_id,
            channel: event.channel().to_string(),
            payload: serde_json::to_string(event)?,
            status: OutboxStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
            dispatched_at: None,
        })
    }
}

/// Outbox half of the store, drained by the background relay.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Pending entries, oldest first.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError>;

    async fn mark_sent(&self, id: Uuid) -> Result<(), StoreError>;

    /// Bump the attempt counter; returns the new count.
    async fn record_failure(&self, id: Uuid) -> Result<u32, StoreError>;

    /// Dead-letter the entry; it will not be offered again.
    async fn mark_dead(&self, id: Uuid) -> Result<(), StoreError>;
}
