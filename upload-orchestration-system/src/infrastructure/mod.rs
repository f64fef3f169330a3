mod background_service;
mod config;
mod database;
mod internal_message_consumer;
mod message_queue;
mod repository;
mod service;
mod service_provider;
mod telemetry;

pub use config::{build_config, UploadSystemConfig};
pub use service_provider::ServiceProvider;
pub use telemetry::initialize_telemetry;
