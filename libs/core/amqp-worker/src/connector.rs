//! Broker connection lifecycle
//!
//! Opens the connection, declares the topology and hands out the channel.
//! Connection-level failures are retried on a fixed interval; bad
//! credentials and topology mismatches fail on the first attempt.

use crate::config::BrokerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::registry::QueueDef;
use crate::topology::Topology;
use database::common::{RetryConfig, retry_if};
use lapin::{Channel, Connection, ConnectionProperties};
use std::time::Duration;
use tracing::{info, warn};

/// Owns the broker connection and the channel opened on it
pub struct BrokerConnector {
    config: BrokerConfig,
    topology: Topology,
    connection: Option<Connection>,
    channel: Option<Channel>,
}

impl BrokerConnector {
    pub fn new(config: BrokerConfig, topology: Topology) -> Self {
        Self {
            config,
            topology,
            connection: None,
            channel: None,
        }
    }

    pub fn from_queue_def<Q: QueueDef>(config: BrokerConfig) -> Self {
        Self::new(config, Q::topology())
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Connect using the attempts and delay from [`BrokerConfig`].
    pub async fn connect_with_config(&mut self) -> WorkerResult<Channel> {
        self.connect(self.config.connect_attempts, self.config.retry_delay)
            .await
    }

    /// Connect and declare the topology, making up to `max_attempts` tries
    /// separated by `delay`.
    ///
    /// Returns [`WorkerError::Authentication`] as soon as the broker refuses
    /// the credentials and [`WorkerError::ConnectionExhausted`] once every
    /// attempt failed at the connection level.
    pub async fn connect(&mut self, max_attempts: u32, delay: Duration) -> WorkerResult<Channel> {
        let attempts = max_attempts.max(1);
        info!(
            uri = %self.config.redacted_uri(),
            max_attempts = attempts,
            delay_secs = delay.as_secs_f64(),
            "Connecting to RabbitMQ"
        );

        let result = retry_if(
            || self.open(),
            RetryConfig::fixed(attempts, delay),
            WorkerError::is_retryable_connect,
        )
        .await;

        let (connection, channel) = match result {
            Ok(pair) => pair,
            Err(e) if e.is_retryable_connect() => {
                return Err(WorkerError::ConnectionExhausted {
                    attempts,
                    last_error: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        info!(
            queue = %self.topology.queue,
            dlq = %self.topology.dlq,
            "Connected to RabbitMQ, topology ready"
        );

        self.connection = Some(connection);
        self.channel = Some(channel.clone());
        Ok(channel)
    }

    async fn open(&self) -> WorkerResult<(Connection, Channel)> {
        let properties = ConnectionProperties::default()
            .with_connection_name(self.config.connection_name.clone().into());

        let connection = Connection::connect(&self.config.uri(), properties)
            .await
            .map_err(WorkerError::from_connect_error)?;

        let channel = connection.create_channel().await?;

        if let Err(e) = self.topology.declare(&channel).await {
            let _ = connection.close(200, "topology declaration failed").await;
            return Err(e);
        }

        Ok((connection, channel))
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.status().connected())
    }

    /// Close the connection if one is open. Safe to call repeatedly.
    pub async fn close(&mut self) -> WorkerResult<()> {
        self.channel = None;
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };

        if !connection.status().connected() {
            return Ok(());
        }

        match connection.close(200, "closing").await {
            Ok(()) => {
                info!("RabbitMQ connection closed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Error while closing RabbitMQ connection");
                Err(e.into())
            }
        }
    }
}
