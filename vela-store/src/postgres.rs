use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use vela_core::events::OrderEvent;
use vela_core::models::{Order, OrderItem, OrderStatus};
use vela_core::notification::{Notification, NotificationStore};
use vela_core::store::{OrderStore, OutboxEntry, OutboxStatus, OutboxStore, StoreError};

/// Postgres-backed store. Every mutating operation writes the order row and
/// the raised outbox rows inside one transaction; transitions take a row
/// lock (`FOR UPDATE`) so concurrent check-then-write sequences against the
/// same order serialize.
pub struct PgStore {
    pool: PgPool,
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    total: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    price: Decimal,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    order_id: Uuid,
    channel: String,
    payload: String,
    status: String,
    attempts: i32,
    created_at: DateTime<Utc>,
    dispatched_at: Option<DateTime<Utc>>,
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn order_from_rows(row: OrderRow, item_rows: Vec<OrderItemRow>) -> Result<Order, StoreError> {
    let status = OrderStatus::parse(&row.status)
        .ok_or_else(|| StoreError::Backend(format!("unknown order status {:?}", row.status)))?;

    let items = item_rows
        .into_iter()
        .map(|item| OrderItem {
            id: item.id,
            order_id: item.order_id,
            product_id: item.product_id,
            quantity: item.quantity.max(0) as u32,
            price: item.price,
            created_at: item.created_at,
        })
        .collect();

    Ok(Order {
        id: row.id,
        user_id: row.user_id,
        total: row.total,
        status,
        items,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn outbox_from_row(row: OutboxRow) -> Result<OutboxEntry, StoreError> {
    let status = OutboxStatus::parse(&row.status)
        .ok_or_else(|| StoreError::Backend(format!("unknown outbox status {:?}", row.status)))?;

    Ok(OutboxEntry {
        id: row.id,
        order_id: row.order_id,
        channel: row.channel,
        payload: row.payload,
        status,
        attempts: row.attempts.max(0) as u32,
        created_at: row.created_at,
        dispatched_at: row.dispatched_at,
    })
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn fetch_items(
        &self,
        executor: impl sqlx::PgExecutor<'_>,
        order_id: Uuid,
    ) -> Result<Vec<OrderItemRow>, sqlx::Error> {
        sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, order_id, product_id, quantity, price, created_at \
             FROM order_items WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(executor)
        .await
    }
}

async fn insert_outbox_entries(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    events: &[OrderEvent],
) -> Result<(), StoreError> {
    for event in events {
        let entry = OutboxEntry::for_event(event)?;
        sqlx::query(
            "INSERT INTO event_outbox (id, order_id, channel, payload, status, attempts, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.id)
        .bind(entry.order_id)
        .bind(&entry.channel)
        .bind(&entry.payload)
        .bind(entry.status.as_str())
        .bind(entry.attempts as i32)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await
        .map_err(backend)?;
    }
    Ok(())
}

#[async_trait]
impl OrderStore for PgStore {
    async fn load(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, total, status, created_at, updated_at \
             FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => {
                let items = self.fetch_items(&self.pool, id).await.map_err(backend)?;
                Ok(Some(order_from_rows(row, items)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, order: &Order, events: &[OrderEvent]) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            "INSERT INTO orders (id, user_id, total, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET \
                 total = EXCLUDED.total, \
                 status = EXCLUDED.status, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.total)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        // Items are replaced wholesale; updates carry the full list.
        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order.id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, quantity, price, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(item.id)
            .bind(item.order_id)
            .bind(item.product_id)
            .bind(item.quantity as i32)
            .bind(item.price)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        insert_outbox_entries(&mut tx, events).await?;

        tx.commit().await.map_err(backend)?;
        Ok(order.clone())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        events: &[OrderEvent],
    ) -> Result<Option<Order>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, total, status, created_at, updated_at \
             FROM orders WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };
        if row.status != from.as_str() {
            // Another writer got there first; the guard fails, nothing is
            // written.
            return Ok(None);
        }

        let updated_at = Utc::now();
        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(to.as_str())
            .bind(updated_at)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        insert_outbox_entries(&mut tx, events).await?;

        let items = self.fetch_items(&mut *tx, id).await.map_err(backend)?;
        tx.commit().await.map_err(backend)?;

        let mut order = order_from_rows(row, items)?;
        order.status = to;
        order.updated_at = updated_at;
        Ok(Some(order))
    }

    async fn find_stale_by_status(
        &self,
        statuses: &[OrderStatus],
        before: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError> {
        let status_strings: Vec<String> =
            statuses.iter().map(|s| s.as_str().to_string()).collect();

        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, total, status, created_at, updated_at \
             FROM orders WHERE status = ANY($1) AND created_at < $2 \
             ORDER BY created_at ASC",
        )
        .bind(&status_strings)
        .bind(before)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let items = self.fetch_items(&self.pool, row.id).await.map_err(backend)?;
            orders.push(order_from_rows(row, items)?);
        }
        Ok(orders)
    }
}

#[async_trait]
impl OutboxStore for PgStore {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            "SELECT id, order_id, channel, payload, status, attempts, created_at, dispatched_at \
             FROM event_outbox WHERE status = 'PENDING' \
             ORDER BY created_at ASC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(outbox_from_row).collect()
    }

    async fn mark_sent(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE event_outbox SET status = 'SENT', dispatched_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn record_failure(&self, id: Uuid) -> Result<u32, StoreError> {
        let attempts: i32 = sqlx::query_scalar(
            "UPDATE event_outbox SET attempts = attempts + 1 WHERE id = $1 RETURNING attempts",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(attempts.max(0) as u32)
    }

    async fn mark_dead(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE event_outbox SET status = 'DEAD' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn save(&self, notification: &Notification) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO notifications (id, order_id, user_id, event_type, message, channel, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(notification.id)
        .bind(notification.order_id)
        .bind(notification.user_id)
        .bind(notification.event_type.as_str())
        .bind(&notification.message)
        .bind(notification.channel.as_str())
        .bind(notification.status.as_str())
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}
