pub mod bus;
pub mod error;
pub mod events;
pub mod models;
pub mod notification;
pub mod payment;
pub mod store;

pub use bus::EventBus;
pub use error::HandlerError;
pub use events::{EventHeader, EventPayload, OrderEvent};
pub use models::{Order, OrderItem, OrderStatus};
pub use notification::{Notification, NotificationGateway, NotificationStore};
pub use payment::{PaymentDecision, PaymentGateway};
pub use store::{OrderStore, OutboxEntry, OutboxStatus, OutboxStore, StoreError};
