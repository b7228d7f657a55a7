pub mod app_config;
pub mod audit_repo;
pub mod booking_repo;
pub mod database;
pub mod events;
pub mod memory;
pub mod redis_repo;
pub mod screening_repo;

pub use audit_repo::StoreAuditRepository;
pub use booking_repo::StoreBookingRepository;
pub use database::DbClient;
pub use events::KafkaEventBus;
pub use redis_repo::RedisClient;
pub use screening_repo::StoreScreeningRepository;
