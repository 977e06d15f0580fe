//! PostgreSQL connection pool (SeaORM)

mod config;
mod connector;

pub use config::PostgresConfig;
pub use connector::{connect, connect_from_config_with_retry, connect_with_retry};

pub use sea_orm::{ConnectOptions, DatabaseConnection, DbErr};
