use async_trait::async_trait;

use crate::models::Order;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentDecision {
    Approved,
    Declined,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// The simulated gateway wait was interrupted. Logged as a failure; the
    /// order keeps its current state and the delivery is not retried.
    #[error("payment processing interrupted")]
    Interrupted,

    #[error("payment gateway failure: {0}")]
    Gateway(String),
}

/// External payment step. The simulated implementation waits a fixed
/// latency and flips a configurable coin; tests inject deterministic
/// implementations (or pin the probability to 0.0 / 1.0).
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, order: &Order) -> Result<PaymentDecision, PaymentError>;
}
