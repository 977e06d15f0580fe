//! In-memory broker for tests
//!
//! Mimics the RabbitMQ behaviour workers and replays depend on: FIFO queues,
//! delivery tags, unacked tracking, dead-lettering on reject with `x-death`
//! headers, and requeue of unacked messages when a channel goes away.

use crate::channel::{InboundMessage, MessageSource, ReplayChannel};
use crate::error::{WorkerError, WorkerResult};
use crate::topology::Topology;
use async_trait::async_trait;
use lapin::BasicProperties;
use lapin::types::{AMQPValue, FieldArray, FieldTable, LongString};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone)]
struct StoredMessage {
    body: Vec<u8>,
    properties: BasicProperties,
    redelivered: bool,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<StoredMessage>>,
    /// main queue -> its dead-letter queue
    routes: HashMap<String, String>,
    unacked: HashMap<u64, (String, StoredMessage)>,
    next_tag: u64,
    publishes: u64,
    fail_publish_at: Option<u64>,
    acked: u64,
    rejected: u64,
}

impl BrokerState {
    fn deliver(&mut self, queue: &str) -> Option<InboundMessage> {
        let message = self.queues.get_mut(queue)?.pop_front()?;
        self.next_tag += 1;
        let tag = self.next_tag;
        self.unacked
            .insert(tag, (queue.to_string(), message.clone()));
        Some(InboundMessage {
            delivery_tag: tag,
            body: message.body,
            properties: message.properties,
            redelivered: message.redelivered,
        })
    }

    fn ack(&mut self, delivery_tag: u64) -> WorkerResult<()> {
        self.unacked
            .remove(&delivery_tag)
            .ok_or_else(|| unknown_tag(delivery_tag))?;
        self.acked += 1;
        Ok(())
    }

    fn reject(&mut self, delivery_tag: u64) -> WorkerResult<()> {
        let (queue, message) = self
            .unacked
            .remove(&delivery_tag)
            .ok_or_else(|| unknown_tag(delivery_tag))?;
        self.rejected += 1;

        if let Some(dlq) = self.routes.get(&queue).cloned() {
            let properties = with_death_headers(message.properties, &queue);
            self.queues
                .entry(dlq)
                .or_default()
                .push_back(StoredMessage {
                    body: message.body,
                    properties,
                    redelivered: false,
                });
        }
        Ok(())
    }
}

fn unknown_tag(delivery_tag: u64) -> WorkerError {
    WorkerError::Channel(format!("unknown delivery tag {delivery_tag}"))
}

fn long_string(value: &str) -> AMQPValue {
    AMQPValue::LongString(LongString::from(value))
}

/// Headers RabbitMQ adds when it dead-letters a rejected message.
fn with_death_headers(properties: BasicProperties, queue: &str) -> BasicProperties {
    let mut headers = properties.headers().clone().unwrap_or_default();

    let mut death = FieldTable::default();
    death.insert("count".into(), AMQPValue::LongLongInt(1));
    death.insert("reason".into(), long_string("rejected"));
    death.insert("queue".into(), long_string(queue));
    death.insert("exchange".into(), long_string(""));
    death.insert(
        "routing-keys".into(),
        AMQPValue::FieldArray(FieldArray::from(vec![long_string(queue)])),
    );

    headers.insert(
        "x-death".into(),
        AMQPValue::FieldArray(FieldArray::from(vec![AMQPValue::FieldTable(death)])),
    );
    for prefix in ["x-first-death", "x-last-death"] {
        headers.insert(format!("{prefix}-exchange").into(), long_string(""));
        headers.insert(format!("{prefix}-queue").into(), long_string(queue));
        headers.insert(format!("{prefix}-reason").into(), long_string("rejected"));
    }

    properties.with_headers(headers)
}

/// Shared in-memory broker; clones share state
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the queues of `topology` and route rejects from the main queue
    /// to its DLQ.
    pub async fn declare(&self, topology: &Topology) {
        let mut state = self.state.lock().await;
        state.queues.entry(topology.queue.clone()).or_default();
        state.queues.entry(topology.dlq.clone()).or_default();
        state
            .routes
            .insert(topology.queue.clone(), topology.dlq.clone());
    }

    pub async fn declare_queue(&self, queue: &str) {
        self.state
            .lock()
            .await
            .queues
            .entry(queue.to_string())
            .or_default();
    }

    pub async fn enqueue(&self, queue: &str, body: impl Into<Vec<u8>>) {
        let properties = BasicProperties::default().with_delivery_mode(2);
        self.enqueue_with_properties(queue, body, properties).await;
    }

    pub async fn enqueue_with_properties(
        &self,
        queue: &str,
        body: impl Into<Vec<u8>>,
        properties: BasicProperties,
    ) {
        self.state
            .lock()
            .await
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(StoredMessage {
                body: body.into(),
                properties,
                redelivered: false,
            });
        self.notify.notify_waiters();
    }

    pub async fn enqueue_json<T: Serialize>(&self, queue: &str, payload: &T) -> WorkerResult<()> {
        let body = serde_json::to_vec(payload)?;
        self.enqueue(queue, body).await;
        Ok(())
    }

    /// Ready (not unacked) messages in `queue`
    pub async fn depth(&self, queue: &str) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    /// Ready messages in `queue`, front first, without consuming them
    pub async fn peek(&self, queue: &str) -> Vec<InboundMessage> {
        self.state
            .lock()
            .await
            .queues
            .get(queue)
            .map(|messages| {
                messages
                    .iter()
                    .map(|m| InboundMessage {
                        delivery_tag: 0,
                        body: m.body.clone(),
                        properties: m.properties.clone(),
                        redelivered: m.redelivered,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn unacked_count(&self) -> usize {
        self.state.lock().await.unacked.len()
    }

    pub async fn acked_count(&self) -> u64 {
        self.state.lock().await.acked
    }

    pub async fn rejected_count(&self) -> u64 {
        self.state.lock().await.rejected
    }

    /// Make the `nth` publish from now on fail (1-based).
    pub async fn fail_publish_at(&self, nth: u64) {
        let mut state = self.state.lock().await;
        state.fail_publish_at = Some(state.publishes + nth);
    }

    /// Return every unacked message to the front of its queue, as the broker
    /// does when a channel closes.
    pub async fn recover(&self) {
        let mut state = self.state.lock().await;
        let mut pending: Vec<_> = state.unacked.drain().collect();
        pending.sort_by_key(|(tag, _)| std::cmp::Reverse(*tag));
        for (_, (queue, mut message)) in pending {
            message.redelivered = true;
            state.queues.entry(queue).or_default().push_front(message);
        }
        drop(state);
        self.notify.notify_waiters();
    }

    /// Consumer on `queue`
    pub fn consumer(&self, queue: impl Into<String>) -> MemoryConsumer {
        MemoryConsumer {
            broker: self.clone(),
            queue: queue.into(),
            cancelled: false,
        }
    }
}

#[async_trait]
impl ReplayChannel for MemoryBroker {
    async fn message_count(&self, queue: &str) -> WorkerResult<u32> {
        let state = self.state.lock().await;
        state
            .queues
            .get(queue)
            .map(|q| q.len() as u32)
            .ok_or_else(|| WorkerError::QueueNotFound(queue.to_string()))
    }

    async fn fetch(&self, queue: &str) -> WorkerResult<Option<InboundMessage>> {
        let mut state = self.state.lock().await;
        if !state.queues.contains_key(queue) {
            return Err(WorkerError::QueueNotFound(queue.to_string()));
        }
        Ok(state.deliver(queue))
    }

    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        properties: BasicProperties,
    ) -> WorkerResult<()> {
        let mut state = self.state.lock().await;
        state.publishes += 1;
        if state.fail_publish_at == Some(state.publishes) {
            return Err(WorkerError::Publish {
                queue: queue.to_string(),
                reason: "broker nacked the publish".to_string(),
            });
        }

        // The default exchange drops messages for queues that do not exist.
        if let Some(messages) = state.queues.get_mut(queue) {
            messages.push_back(StoredMessage {
                body: body.to_vec(),
                properties,
                redelivered: false,
            });
        }
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> WorkerResult<()> {
        self.state.lock().await.ack(delivery_tag)
    }
}

/// [`MessageSource`] over a [`MemoryBroker`] queue
pub struct MemoryConsumer {
    broker: MemoryBroker,
    queue: String,
    cancelled: bool,
}

impl MemoryConsumer {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

#[async_trait]
impl MessageSource for MemoryConsumer {
    async fn next_message(&mut self, wait: Duration) -> WorkerResult<Option<InboundMessage>> {
        if self.cancelled {
            return Ok(None);
        }

        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let notified = self.broker.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.broker.state.lock().await.deliver(&self.queue) {
                return Ok(Some(message));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&mut self, delivery_tag: u64) -> WorkerResult<()> {
        self.broker.state.lock().await.ack(delivery_tag)
    }

    async fn reject(&mut self, delivery_tag: u64) -> WorkerResult<()> {
        self.broker.state.lock().await.reject(delivery_tag)
    }

    async fn cancel(&mut self) -> WorkerResult<()> {
        self.cancelled = true;
        Ok(())
    }
}
