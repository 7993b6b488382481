use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::info;

use vela_core::models::Order;
use vela_core::payment::{PaymentDecision, PaymentError, PaymentGateway};

/// Stand-in for an external payment provider: waits a fixed latency to model
/// the network round-trip, then flips a coin. Pin the probability to 1.0 or
/// 0.0 for deterministic outcomes.
pub struct SimulatedPaymentGateway {
    latency: Duration,
    success_probability: f64,
}

impl SimulatedPaymentGateway {
    pub fn new(latency: Duration, success_probability: f64) -> Self {
        Self {
            latency,
            success_probability: success_probability.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    async fn charge(&self, order: &Order) -> Result<PaymentDecision, PaymentError> {
        info!(
            "Simulating payment processing for order {} ({} ms)...",
            order.id,
            self.latency.as_millis()
        );
        tokio::time::sleep(self.latency).await;

        let approved = rand::thread_rng().gen_bool(self.success_probability);
        Ok(if approved {
            PaymentDecision::Approved
        } else {
            PaymentDecision::Declined
        })
    }
}
