//! DLQ Replay
//!
//! Run-to-completion tool that moves every message in `payment_events.dlq`
//! back onto `payment_events`.
//!
//! ```text
//! payment_events.dlq ──basic_get──▶ strip x-death / x-*-death-* headers
//!                                         │
//!                     ack ◀── confirm ◀── publish to payment_events
//! ```
//!
//! A message leaves the DLQ only after the broker confirmed its republish, so
//! a halted run keeps the rest of the batch in the DLQ and is safe to re-run.

use amqp_worker::{
    AmqpChannel, BrokerConfig, BrokerConnector, DlqReplayer, QueueDef, ReplayChannel,
    ReplaySummary, Topology, WorkerResult,
};
use clap::Parser;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{Environment, FromEnv};
use domain_payments::PaymentQueue;
use eyre::{Result, WrapErr};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "flowpay-dlq-replay")]
#[command(about = "Replay dead-lettered payment events onto the main queue")]
pub struct Cli {
    /// Only report how many messages wait in the DLQ
    #[arg(long)]
    pub count_only: bool,

    /// Connection attempts before giving up (overrides RABBITMQ_CONNECT_RETRIES)
    #[arg(long)]
    pub connect_retries: Option<u32>,

    /// Seconds between connection attempts (overrides RABBITMQ_RETRY_DELAY_SECS)
    #[arg(long)]
    pub retry_delay_secs: Option<u64>,
}

impl Cli {
    fn apply(&self, config: BrokerConfig) -> BrokerConfig {
        let attempts = self.connect_retries.unwrap_or(config.connect_attempts);
        let delay = self
            .retry_delay_secs
            .map(Duration::from_secs)
            .unwrap_or(config.retry_delay);
        config.with_retry(attempts, delay)
    }
}

/// Replay (or just count) the DLQ behind `topology` over `channel`
pub async fn execute<C: ReplayChannel>(
    channel: C,
    topology: &Topology,
    count_only: bool,
) -> WorkerResult<ReplaySummary> {
    if count_only {
        let found = channel.message_count(&topology.dlq).await?;
        info!(dlq = %topology.dlq, found, "DLQ depth");
        return Ok(ReplaySummary {
            found,
            replayed: 0,
            halted: None,
        });
    }

    DlqReplayer::new(channel, topology).replay().await
}

/// Connect, replay the payment DLQ and close the connection
///
/// The connector declares the full payment topology before handing out the
/// channel, the same way the worker does on start. A DLQ that did not exist
/// yet is therefore created empty and reported as `found = 0` rather than
/// failing the run.
///
/// # Errors
///
/// Returns an error when the broker is unreachable, refuses the credentials,
/// or rejects the topology declaration (for example a queue that exists with
/// different arguments). A republish failure is not an error: it is reported
/// through [`ReplaySummary::halted`].
pub async fn run(cli: Cli) -> Result<ReplaySummary> {
    install_color_eyre();
    let environment = Environment::from_env();
    init_tracing(&environment);

    let broker_config = BrokerConfig::from_env()
        .wrap_err("Failed to load RabbitMQ configuration")?
        .with_connection_name("flowpay-dlq-replay");
    let mut connector = BrokerConnector::from_queue_def::<PaymentQueue>(cli.apply(broker_config));

    let channel = connector
        .connect_with_config()
        .await
        .wrap_err("Cannot connect to RabbitMQ")?;
    let channel = AmqpChannel::new(channel)
        .await
        .wrap_err("Failed to enable publisher confirms")?;

    let topology = PaymentQueue::topology();
    let result = execute(channel, &topology, cli.count_only).await;

    if let Err(e) = connector.close().await {
        error!(error = %e, "Failed to close RabbitMQ connection");
    }
    let summary = result.wrap_err_with(|| format!("Failed to replay {}", topology.dlq))?;

    if let Some(reason) = &summary.halted {
        error!(
            replayed = summary.replayed,
            found = summary.found,
            reason = %reason,
            "Replay halted, re-run once the broker is healthy"
        );
    } else {
        info!(replayed = summary.replayed, "Replay complete");
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use amqp_worker::testing::MemoryBroker;

    async fn broker_with_dead_letters(n: usize) -> MemoryBroker {
        let broker = MemoryBroker::new();
        broker.declare(&PaymentQueue::topology()).await;
        for i in 0..n {
            broker
                .enqueue(
                    PaymentQueue::DLQ_NAME,
                    format!(r#"{{"order_id":"ORD-{i}","amount":1}}"#),
                )
                .await;
        }
        broker
    }

    #[test]
    fn test_cli_needs_no_arguments() {
        let cli = Cli::try_parse_from(["flowpay-dlq-replay"]).unwrap();
        assert!(!cli.count_only);
        assert!(cli.connect_retries.is_none());
    }

    #[test]
    fn test_cli_overrides_retry_settings() {
        let cli = Cli::try_parse_from([
            "flowpay-dlq-replay",
            "--connect-retries",
            "9",
            "--retry-delay-secs",
            "3",
        ])
        .unwrap();

        let config = cli.apply(BrokerConfig::default());
        assert_eq!(config.connect_attempts, 9);
        assert_eq!(config.retry_delay, Duration::from_secs(3));
    }

    #[test]
    fn test_cli_keeps_configured_retry_settings() {
        let cli = Cli::try_parse_from(["flowpay-dlq-replay"]).unwrap();
        let config = cli.apply(BrokerConfig::default().with_retry(7, Duration::from_secs(4)));

        assert_eq!(config.connect_attempts, 7);
        assert_eq!(config.retry_delay, Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_execute_replays_everything() {
        let broker = broker_with_dead_letters(3).await;

        let summary = execute(broker.clone(), &PaymentQueue::topology(), false)
            .await
            .unwrap();

        assert_eq!(summary.found, 3);
        assert_eq!(summary.replayed, 3);
        assert!(summary.is_complete());
        assert_eq!(broker.depth(PaymentQueue::QUEUE_NAME).await, 3);
        assert_eq!(broker.depth(PaymentQueue::DLQ_NAME).await, 0);
    }

    #[tokio::test]
    async fn test_execute_count_only_moves_nothing() {
        let broker = broker_with_dead_letters(2).await;

        let summary = execute(broker.clone(), &PaymentQueue::topology(), true)
            .await
            .unwrap();

        assert_eq!(summary.found, 2);
        assert_eq!(summary.replayed, 0);
        assert_eq!(broker.depth(PaymentQueue::DLQ_NAME).await, 2);
    }

    #[tokio::test]
    async fn test_execute_reports_halt() {
        let broker = broker_with_dead_letters(3).await;
        broker.fail_publish_at(2).await;

        let summary = execute(broker.clone(), &PaymentQueue::topology(), false)
            .await
            .unwrap();

        assert_eq!(summary.replayed, 1);
        assert!(!summary.is_complete());
    }

    #[tokio::test]
    async fn test_execute_on_freshly_declared_topology_finds_nothing() {
        // What `run` sees when the connector just created the DLQ
        let broker = broker_with_dead_letters(0).await;

        for count_only in [true, false] {
            let summary = execute(broker.clone(), &PaymentQueue::topology(), count_only)
                .await
                .unwrap();
            assert_eq!(summary.found, 0);
            assert_eq!(summary.replayed, 0);
            assert!(summary.is_complete());
        }
        assert_eq!(broker.depth(PaymentQueue::QUEUE_NAME).await, 0);
    }

    #[tokio::test]
    async fn test_execute_missing_dlq_is_error() {
        let broker = MemoryBroker::new();
        assert!(
            execute(broker, &PaymentQueue::topology(), false)
                .await
                .is_err()
        );
    }
}
