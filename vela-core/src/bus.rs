use async_trait::async_trait;

/// Logical broker channels, one per event kind plus the dead-letter route.
pub mod channels {
    pub const ORDER_CREATED: &str = "order-created";
    pub const ORDER_COMPLETED: &str = "order-completed";
    pub const ORDER_EXPIRED: &str = "order-expired";
    pub const DEAD_LETTER: &str = "order-dead-letter";
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("channel {0} has no consumer")]
    ChannelClosed(String),
}

/// Message broker binding. The reference deployment runs three consumers,
/// one per lifecycle channel; implementations may be in-process or a real
/// broker.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, channel: &str, key: &str, payload: &str) -> Result<(), BusError>;
}
