//! RabbitMQ test infrastructure
//!
//! Provides a `TestRabbitMq` helper that starts a broker container. It only
//! exposes connection details so the crates under test build their own
//! connections.

use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::rabbitmq::RabbitMq;

/// Credentials of the stock image
pub const RABBITMQ_USER: &str = "guest";
pub const RABBITMQ_PASS: &str = "guest";

/// Test broker wrapper that ensures proper cleanup
///
/// The container is automatically stopped and removed when this struct is dropped.
pub struct TestRabbitMq {
    #[allow(dead_code)]
    container: ContainerAsync<RabbitMq>,
    pub host: String,
    pub port: u16,
}

impl TestRabbitMq {
    /// Start a broker and wait until it accepts AMQP connections
    ///
    /// # Example
    ///
    /// ```no_run
    /// use test_utils::TestRabbitMq;
    ///
    /// # async fn example() {
    /// let rabbit = TestRabbitMq::new().await;
    /// let uri = rabbit.amqp_url();
    /// # }
    /// ```
    pub async fn new() -> Self {
        let container = RabbitMq::default()
            .start()
            .await
            .expect("Failed to start RabbitMQ container");

        let port = container
            .get_host_port_ipv4(5672)
            .await
            .expect("Failed to get RabbitMQ port");

        tracing::info!(port, "Test RabbitMQ ready");

        Self {
            container,
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    /// AMQP URI for the default vhost
    pub fn amqp_url(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/%2F",
            RABBITMQ_USER, RABBITMQ_PASS, self.host, self.port
        )
    }
}

// Container is automatically cleaned up when TestRabbitMq is dropped
impl Drop for TestRabbitMq {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test RabbitMQ container");
    }
}
