use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationEventType {
    OrderCompleted,
    OrderExpired,
}

impl NotificationEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEventType::OrderCompleted => "ORDER_COMPLETED",
            NotificationEventType::OrderExpired => "ORDER_EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ORDER_COMPLETED" => Some(NotificationEventType::OrderCompleted),
            "ORDER_EXPIRED" => Some(NotificationEventType::OrderExpired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationChannel {
    Email,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "EMAIL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EMAIL" => Some(NotificationChannel::Email),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Sent,
    Pending,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Sent => "SENT",
            NotificationStatus::Pending => "PENDING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SENT" => Some(NotificationStatus::Sent),
            "PENDING" => Some(NotificationStatus::Pending),
            _ => None,
        }
    }
}

/// Record of a delivered or pending notification. Append-only; rows are
/// never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub event_type: NotificationEventType,
    pub message: String,
    pub channel: NotificationChannel,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        order_id: Uuid,
        user_id: Uuid,
        event_type: NotificationEventType,
        message: String,
        channel: NotificationChannel,
        status: NotificationStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            user_id,
            event_type,
            message,
            channel,
            status,
            created_at: Utc::now(),
        }
    }
}

/// Persistence interface for notifications.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn save(&self, notification: &Notification) -> Result<(), StoreError>;
}

/// Outward notification channel (email, push, ...). The reference
/// implementation logs instead of sending; treat it as an external
/// collaborator with its own retry and failure policy.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(
        &self,
        user_id: Uuid,
        subject: &str,
        body: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
