pub mod bus;
pub mod created;
pub mod expiration;
pub mod outbox;
pub mod payment;
pub mod recorder;
pub mod retry;
pub mod service;

pub use bus::{EventHandler, InProcessBus};
pub use created::OrderCreatedHandler;
pub use expiration::{ExpirationScheduler, ExpirationSweeper};
pub use outbox::OutboxRelay;
pub use payment::SimulatedPaymentGateway;
pub use recorder::{LogNotificationGateway, NotificationRecorder, OrderCompletedHandler, OrderExpiredHandler};
pub use retry::RetryPolicy;
pub use service::OrderService;
