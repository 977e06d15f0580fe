//! Exchange and queue topology
//!
//! One durable main queue whose rejected messages flow through a direct
//! dead-letter exchange into a durable dead-letter queue. Declarations are
//! idempotent and run on every connect.

use crate::error::{WorkerError, WorkerResult};
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};
use tracing::debug;

pub const DEAD_LETTER_EXCHANGE_ARG: &str = "x-dead-letter-exchange";
pub const DEAD_LETTER_ROUTING_KEY_ARG: &str = "x-dead-letter-routing-key";

/// Names making up a queue's dead-letter topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub queue: String,
    pub dlq: String,
    pub dlx: String,
    pub routing_key: String,
}

impl Topology {
    pub fn new(
        queue: impl Into<String>,
        dlq: impl Into<String>,
        dlx: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            queue: queue.into(),
            dlq: dlq.into(),
            dlx: dlx.into(),
            routing_key: routing_key.into(),
        }
    }

    /// Arguments attached to the main queue so nacked messages reach the DLQ.
    ///
    /// RabbitMQ rejects a redeclare whose arguments differ, so these must stay
    /// stable across releases.
    pub fn main_queue_arguments(&self) -> FieldTable {
        let mut args = FieldTable::default();
        args.insert(
            DEAD_LETTER_EXCHANGE_ARG.into(),
            AMQPValue::LongString(self.dlx.clone().into()),
        );
        args.insert(
            DEAD_LETTER_ROUTING_KEY_ARG.into(),
            AMQPValue::LongString(self.routing_key.clone().into()),
        );
        args
    }

    /// Declare DLX, DLQ, binding and main queue, in that order.
    pub async fn declare(&self, channel: &Channel) -> WorkerResult<()> {
        let durable_exchange = ExchangeDeclareOptions {
            durable: true,
            ..Default::default()
        };
        channel
            .exchange_declare(
                &self.dlx,
                ExchangeKind::Direct,
                durable_exchange,
                FieldTable::default(),
            )
            .await
            .map_err(|e| self.topology_error(&self.dlx, e))?;

        let durable_queue = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };
        channel
            .queue_declare(&self.dlq, durable_queue, FieldTable::default())
            .await
            .map_err(|e| self.topology_error(&self.dlq, e))?;

        channel
            .queue_bind(
                &self.dlq,
                &self.dlx,
                &self.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| self.topology_error(&self.dlq, e))?;

        channel
            .queue_declare(&self.queue, durable_queue, self.main_queue_arguments())
            .await
            .map_err(|e| self.topology_error(&self.queue, e))?;

        debug!(
            queue = %self.queue,
            dlq = %self.dlq,
            dlx = %self.dlx,
            routing_key = %self.routing_key,
            "Topology declared"
        );
        Ok(())
    }

    fn topology_error(&self, name: &str, err: lapin::Error) -> WorkerError {
        WorkerError::Topology {
            name: name.to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::ShortString;

    #[test]
    fn test_main_queue_arguments_point_at_dead_letter_pair() {
        let topology = Topology::new(
            "payment_events",
            "payment_events.dlq",
            "dlx_payment",
            "dead_letter",
        );
        let args = topology.main_queue_arguments();
        let inner = args.inner();

        assert_eq!(inner.len(), 2);
        assert_eq!(
            inner.get(&ShortString::from(DEAD_LETTER_EXCHANGE_ARG)),
            Some(&AMQPValue::LongString("dlx_payment".into()))
        );
        assert_eq!(
            inner.get(&ShortString::from(DEAD_LETTER_ROUTING_KEY_ARG)),
            Some(&AMQPValue::LongString("dead_letter".into()))
        );
    }
}
