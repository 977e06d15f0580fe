//! Redis connection management

mod config;
mod connector;

pub use config::RedisConfig;
pub use connector::{connect, connect_from_config_with_retry, connect_with_retry};

pub use redis::aio::ConnectionManager;
