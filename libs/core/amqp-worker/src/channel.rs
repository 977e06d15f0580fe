//! Channel abstractions used by the worker loop and the DLQ replayer.
//!
//! - `MessageSource`: push-style consumption with explicit settlement
//! - `ReplayChannel`: pull-style access with publisher confirms
//!
//! `AmqpConsumer` and `AmqpChannel` implement them over lapin; the
//! `testing` feature adds an in-memory broker implementing both.

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicGetOptions, BasicNackOptions,
    BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Consumer};
use std::time::Duration;
use tracing::{debug, info};

/// A delivery awaiting settlement
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub delivery_tag: u64,
    pub body: Vec<u8>,
    pub properties: BasicProperties,
    pub redelivered: bool,
}

impl From<Delivery> for InboundMessage {
    fn from(delivery: Delivery) -> Self {
        Self {
            delivery_tag: delivery.delivery_tag,
            body: delivery.data,
            properties: delivery.properties,
            redelivered: delivery.redelivered,
        }
    }
}

/// Source of deliveries for a [`QueueWorker`](crate::QueueWorker)
#[async_trait]
pub trait MessageSource: Send {
    /// Wait up to `wait` for the next delivery. `Ok(None)` means the wait
    /// elapsed with nothing to do.
    async fn next_message(&mut self, wait: Duration) -> WorkerResult<Option<InboundMessage>>;

    async fn ack(&mut self, delivery_tag: u64) -> WorkerResult<()>;

    /// Negative-acknowledge without requeue, routing the message to the DLX.
    async fn reject(&mut self, delivery_tag: u64) -> WorkerResult<()>;

    /// Stop receiving new deliveries.
    async fn cancel(&mut self) -> WorkerResult<()>;
}

/// Pull-style channel operations the DLQ replayer needs
#[async_trait]
pub trait ReplayChannel: Send + Sync {
    /// Message count from a passive declare; fails if the queue is missing.
    async fn message_count(&self, queue: &str) -> WorkerResult<u32>;

    /// Fetch one message without auto-ack.
    async fn fetch(&self, queue: &str) -> WorkerResult<Option<InboundMessage>>;

    /// Publish to `queue` through the default exchange and wait for the
    /// broker's confirm.
    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        properties: BasicProperties,
    ) -> WorkerResult<()>;

    async fn ack(&self, delivery_tag: u64) -> WorkerResult<()>;
}

/// Consumer bound to one queue on a lapin channel
pub struct AmqpConsumer {
    channel: Channel,
    consumer: Consumer,
    consumer_tag: String,
    cancelled: bool,
}

impl AmqpConsumer {
    /// Apply the prefetch limit and start consuming `config.queue_name`.
    pub async fn start(channel: Channel, config: &WorkerConfig) -> WorkerResult<Self> {
        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await?;

        let consumer = channel
            .basic_consume(
                &config.queue_name,
                &config.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(
            queue = %config.queue_name,
            consumer_tag = %config.consumer_tag,
            prefetch = config.prefetch_count,
            "Consumer started"
        );

        Ok(Self {
            channel,
            consumer,
            consumer_tag: config.consumer_tag.clone(),
            cancelled: false,
        })
    }
}

#[async_trait]
impl MessageSource for AmqpConsumer {
    async fn next_message(&mut self, wait: Duration) -> WorkerResult<Option<InboundMessage>> {
        match tokio::time::timeout(wait, self.consumer.next()).await {
            Err(_) => Ok(None),
            Ok(None) => Err(WorkerError::ConsumerClosed),
            Ok(Some(Err(e))) => Err(e.into()),
            Ok(Some(Ok(delivery))) => Ok(Some(delivery.into())),
        }
    }

    async fn ack(&mut self, delivery_tag: u64) -> WorkerResult<()> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    async fn reject(&mut self, delivery_tag: u64) -> WorkerResult<()> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue: false,
                },
            )
            .await?;
        Ok(())
    }

    async fn cancel(&mut self) -> WorkerResult<()> {
        if self.cancelled || !self.channel.status().connected() {
            return Ok(());
        }
        self.channel
            .basic_cancel(&self.consumer_tag, BasicCancelOptions::default())
            .await?;
        self.cancelled = true;
        debug!(consumer_tag = %self.consumer_tag, "Consumer cancelled");
        Ok(())
    }
}

/// Channel in confirm mode for republishing
pub struct AmqpChannel {
    channel: Channel,
}

impl AmqpChannel {
    /// Put the channel into publisher-confirm mode.
    pub async fn new(channel: Channel) -> WorkerResult<Self> {
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        Ok(Self { channel })
    }
}

#[async_trait]
impl ReplayChannel for AmqpChannel {
    async fn message_count(&self, queue: &str) -> WorkerResult<u32> {
        let passive = QueueDeclareOptions {
            passive: true,
            durable: true,
            ..Default::default()
        };
        let state = self
            .channel
            .queue_declare(queue, passive, FieldTable::default())
            .await
            .map_err(|e| WorkerError::from_passive_declare(queue, e))?;
        Ok(state.message_count())
    }

    async fn fetch(&self, queue: &str) -> WorkerResult<Option<InboundMessage>> {
        let message = self
            .channel
            .basic_get(queue, BasicGetOptions { no_ack: false })
            .await?;
        Ok(message.map(|m| m.delivery.into()))
    }

    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        properties: BasicProperties,
    ) -> WorkerResult<()> {
        let confirmation = self
            .channel
            .basic_publish("", queue, BasicPublishOptions::default(), body, properties)
            .await
            .map_err(|e| WorkerError::Publish {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?
            .await
            .map_err(|e| WorkerError::Publish {
                queue: queue.to_string(),
                reason: format!("confirmation failed: {e}"),
            })?;

        if confirmation.is_nack() {
            return Err(WorkerError::Publish {
                queue: queue.to_string(),
                reason: "broker nacked the publish".to_string(),
            });
        }
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> WorkerResult<()> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }
}
