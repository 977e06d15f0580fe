//! Broker and worker configuration
//!
//! - `BrokerConfig`: where and how to connect to RabbitMQ
//! - `WorkerConfig`: which queue a worker consumes and how it polls

use crate::registry::QueueDef;
use core_config::{ConfigError, FromEnv, env_or_default, env_parse};
use std::time::Duration;
use uuid::Uuid;

/// RabbitMQ connection settings
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    /// Shown in the management UI's connection list
    pub connection_name: String,
    /// Connection attempts before giving up (includes the first)
    pub connect_attempts: u32,
    /// Fixed pause between connection attempts
    pub retry_delay: Duration,
}

impl BrokerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_vhost(mut self, vhost: impl Into<String>) -> Self {
        self.vhost = vhost.into();
        self
    }

    pub fn with_connection_name(mut self, name: impl Into<String>) -> Self {
        self.connection_name = name.into();
        self
    }

    pub fn with_retry(mut self, connect_attempts: u32, retry_delay: Duration) -> Self {
        self.connect_attempts = connect_attempts;
        self.retry_delay = retry_delay;
        self
    }

    /// AMQP URI with percent-encoded credentials and vhost.
    ///
    /// The default vhost `/` is encoded as `%2F`.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            urlencoding::encode(&self.vhost)
        )
    }

    /// URI safe to log
    pub fn redacted_uri(&self) -> String {
        format!(
            "amqp://{}:***@{}:{}/{}",
            urlencoding::encode(&self.username),
            self.host,
            self.port,
            urlencoding::encode(&self.vhost)
        )
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "poposing".to_string(),
            password: "poposing1234".to_string(),
            vhost: "/".to_string(),
            connection_name: "flowpay".to_string(),
            connect_attempts: 5,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("vhost", &self.vhost)
            .field("connection_name", &self.connection_name)
            .field("connect_attempts", &self.connect_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

/// Load broker settings from environment variables
///
/// - `RABBITMQ_HOST` (default: localhost)
/// - `RABBITMQ_PORT` (default: 5672)
/// - `RABBITMQ_USER` / `RABBITMQ_PASS`
/// - `RABBITMQ_VHOST` (default: /)
/// - `RABBITMQ_CONNECT_RETRIES` (default: 5)
/// - `RABBITMQ_RETRY_DELAY_SECS` (default: 2)
impl FromEnv for BrokerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let connect_attempts: u32 = env_parse("RABBITMQ_CONNECT_RETRIES", "5")?;
        if connect_attempts == 0 {
            return Err(ConfigError::ParseError {
                key: "RABBITMQ_CONNECT_RETRIES".to_string(),
                details: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            host: env_or_default("RABBITMQ_HOST", &defaults.host),
            port: env_parse("RABBITMQ_PORT", "5672")?,
            username: env_or_default("RABBITMQ_USER", &defaults.username),
            password: env_or_default("RABBITMQ_PASS", &defaults.password),
            vhost: env_or_default("RABBITMQ_VHOST", &defaults.vhost),
            connection_name: defaults.connection_name,
            connect_attempts,
            retry_delay: Duration::from_secs(env_parse("RABBITMQ_RETRY_DELAY_SECS", "2")?),
        })
    }
}

/// Configuration for a queue worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue to consume
    pub queue_name: String,

    /// Queue that receives rejected messages
    pub dlq_name: String,

    /// Unique consumer tag (auto-generated)
    pub consumer_tag: String,

    /// Unacknowledged deliveries the broker may push to this consumer
    pub prefetch_count: u16,

    /// How long a fetch waits before the loop re-checks for shutdown
    pub inactivity_timeout: Duration,
}

impl WorkerConfig {
    /// Create a new WorkerConfig from a QueueDef
    pub fn from_queue_def<Q: QueueDef>() -> Self {
        Self::new(Q::QUEUE_NAME, Q::DLQ_NAME)
    }

    /// Create a new WorkerConfig with explicit queue names
    pub fn new(queue_name: impl Into<String>, dlq_name: impl Into<String>) -> Self {
        let queue_name = queue_name.into();
        Self {
            consumer_tag: format!("{}-{}", queue_name, Uuid::new_v4()),
            queue_name,
            dlq_name: dlq_name.into(),
            prefetch_count: 1,
            inactivity_timeout: Duration::from_secs(1),
        }
    }

    pub fn with_consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }

    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    /// Apply `WORKER_INACTIVITY_TIMEOUT_MS` if set
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        let default_ms = self.inactivity_timeout.as_millis().to_string();
        let timeout_ms: u64 = env_parse("WORKER_INACTIVITY_TIMEOUT_MS", &default_ms)?;
        self.inactivity_timeout = Duration::from_millis(timeout_ms.max(1));
        Ok(self)
    }
}
