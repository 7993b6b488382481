use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use vela_core::events::OrderEvent;
use vela_core::models::{Order, OrderStatus};
use vela_core::notification::{Notification, NotificationStore};
use vela_core::store::{OrderStore, OutboxEntry, OutboxStatus, OutboxStore, StoreError};

#[derive(Default)]
struct Inner {
    orders: HashMap<Uuid, Order>,
    outbox: Vec<OutboxEntry>,
    notifications: Vec<Notification>,
}

/// Thread-safe in-memory store implementing all three persistence traits
/// over one lock, so that "mutation + outbox rows" is atomic exactly like
/// the transactional backends. Used by tests and broker-less runs.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail before mutating anything, to
    /// exercise rollback paths.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated write failure".into()));
        }
        Ok(())
    }

    /// Snapshot of every outbox entry, for assertions.
    pub async fn outbox_entries(&self) -> Vec<OutboxEntry> {
        self.inner.read().await.outbox.clone()
    }

    /// Snapshot of every notification row, for assertions.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.inner.read().await.notifications.clone()
    }
}

fn entries_for(events: &[OrderEvent]) -> Result<Vec<OutboxEntry>, StoreError> {
    events.iter().map(OutboxEntry::for_event).collect()
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn load(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn save(&self, order: &Order, events: &[OrderEvent]) -> Result<Order, StoreError> {
        self.check_writable()?;
        let entries = entries_for(events)?;

        let mut inner = self.inner.write().await;
        inner.orders.insert(order.id, order.clone());
        inner.outbox.extend(entries);
        Ok(order.clone())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        events: &[OrderEvent],
    ) -> Result<Option<Order>, StoreError> {
        self.check_writable()?;
        let entries = entries_for(events)?;

        let mut inner = self.inner.write().await;
        let Some(order) = inner.orders.get_mut(&id) else {
            return Ok(None);
        };
        if order.status != from {
            return Ok(None);
        }

        order.update_status(to);
        let updated = order.clone();
        inner.outbox.extend(entries);
        Ok(Some(updated))
    }

    async fn find_stale_by_status(
        &self,
        statuses: &[OrderStatus],
        before: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.read().await;
        let mut stale: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| statuses.contains(&o.status) && o.created_at < before)
            .cloned()
            .collect();
        stale.sort_by_key(|o| o.created_at);
        Ok(stale)
    }
}

#[async_trait]
impl OutboxStore for MemoryStore {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .outbox
            .iter()
            .filter(|e| e.status == OutboxStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: Uuid) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.outbox.iter_mut().find(|e| e.id == id) {
            entry.status = OutboxStatus::Sent;
            entry.dispatched_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn record_failure(&self, id: Uuid) -> Result<u32, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        match inner.outbox.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.attempts += 1;
                Ok(entry.attempts)
            }
            None => Err(StoreError::Backend(format!("outbox entry {} missing", id))),
        }
    }

    async fn mark_dead(&self, id: Uuid) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.outbox.iter_mut().find(|e| e.id == id) {
            entry.status = OutboxStatus::Dead;
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn save(&self, notification: &Notification) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        inner.notifications.push(notification.clone());
        Ok(())
    }
}
