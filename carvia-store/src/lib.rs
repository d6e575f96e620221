pub mod app_config;
pub mod booking_repo;
pub mod car_repo;
pub mod database;
pub mod events;

pub use booking_repo::PgBookingStore;
pub use car_repo::PgCarLookup;
pub use database::DbClient;
pub use events::{EventProducer, KafkaNotifier};
