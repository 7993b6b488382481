pub mod app_config;
pub mod kafka;
pub mod memory;
pub mod postgres;

pub use app_config::Config;
pub use kafka::KafkaEventBus;
pub use memory::MemoryStore;
pub use postgres::PgStore;
