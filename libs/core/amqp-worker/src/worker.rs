//! Core worker traits and the generic QueueWorker implementation.
//!
//! This module provides:
//! - `JobProcessor` trait for job handlers
//! - `QueueWorker` struct running the consume/settle loop

use crate::channel::{InboundMessage, MessageSource};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics::WorkerMetrics;
use crate::registry::QueueJob;
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What a processor did with a job it accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job ran to a final state (successful or not)
    Completed,
    /// Another consumer already claimed this job
    Skipped,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Skipped => "skipped",
        }
    }
}

/// How a delivery was settled with the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Acknowledged and removed from the queue
    Acked(JobOutcome),
    /// Rejected without requeue, routed to the dead-letter queue
    DeadLettered,
}

/// Trait for job processors.
///
/// Return `Ok` when the message should be acknowledged and `Err` when it
/// should go to the dead-letter queue for a later replay.
///
/// # Example
///
/// ```rust,ignore
/// use amqp_worker::{JobOutcome, JobProcessor, WorkerError};
///
/// struct EmailProcessor {
///     provider: Arc<dyn EmailProvider>,
/// }
///
/// #[async_trait]
/// impl JobProcessor<EmailJob> for EmailProcessor {
///     async fn process(&self, job: &EmailJob) -> Result<JobOutcome, WorkerError> {
///         self.provider.send(&job.to, &job.subject).await.map_err(WorkerError::transient)?;
///         Ok(JobOutcome::Completed)
///     }
///
///     fn name(&self) -> &'static str {
///         "EmailProcessor"
///     }
/// }
/// ```
#[async_trait]
pub trait JobProcessor<J: QueueJob>: Send + Sync {
    /// Process a single job.
    async fn process(&self, job: &J) -> Result<JobOutcome, WorkerError>;

    /// Get the processor name for logging.
    fn name(&self) -> &'static str;
}

/// Generic queue worker.
///
/// Pulls one delivery at a time from a [`MessageSource`], hands the decoded
/// job to the processor and settles the delivery before fetching the next.
/// Deliveries are never requeued: anything the processor rejects goes to the
/// dead-letter queue.
///
/// # Type Parameters
///
/// * `J` - The job type (must implement `QueueJob`)
/// * `P` - The processor type (must implement `JobProcessor<J>`)
/// * `S` - Where deliveries come from
pub struct QueueWorker<J, P, S>
where
    J: QueueJob,
    P: JobProcessor<J>,
    S: MessageSource,
{
    source: S,
    processor: Arc<P>,
    config: WorkerConfig,
    metrics: WorkerMetrics,
    ready: Option<Arc<AtomicBool>>,
    _phantom: PhantomData<fn() -> J>,
}

impl<J, P, S> QueueWorker<J, P, S>
where
    J: QueueJob,
    P: JobProcessor<J>,
    S: MessageSource,
{
    /// Create a new queue worker.
    pub fn new(source: S, processor: P, config: WorkerConfig) -> Self {
        Self::with_arc_processor(source, Arc::new(processor), config)
    }

    /// Create a new queue worker with an Arc processor.
    pub fn with_arc_processor(source: S, processor: Arc<P>, config: WorkerConfig) -> Self {
        let metrics = WorkerMetrics::new(&config.queue_name, processor.name());
        Self {
            source,
            processor,
            config,
            metrics,
            ready: None,
            _phantom: PhantomData,
        }
    }

    /// Flag raised while the loop is consuming; feeds the readiness probe.
    pub fn with_ready_flag(mut self, ready: Arc<AtomicBool>) -> Self {
        self.ready = Some(ready);
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Give back the message source, e.g. to inspect it after `run`.
    pub fn into_source(self) -> S {
        self.source
    }

    /// Run the worker loop until `shutdown` flips to `true`.
    ///
    /// A fetch in progress is abandoned as soon as the flag flips, so a
    /// message arriving after the signal stays on the queue. A message
    /// already in hand is settled first. The consumer is cancelled on the
    /// way out, including when the loop fails.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> WorkerResult<()> {
        info!(
            queue = %self.config.queue_name,
            dlq = %self.config.dlq_name,
            consumer_tag = %self.config.consumer_tag,
            processor = %self.processor.name(),
            prefetch = self.config.prefetch_count,
            inactivity_timeout_ms = self.config.inactivity_timeout.as_millis() as u64,
            "Starting queue worker"
        );
        self.set_ready(true);

        let result = self.consume(&mut shutdown).await;

        self.set_ready(false);
        if let Err(e) = self.source.cancel().await {
            warn!(error = %e, "Failed to cancel consumer");
        }

        match &result {
            Ok(()) => info!("Queue worker stopped"),
            Err(e) => error!(error = %e, "Queue worker stopped on error"),
        }
        result
    }

    async fn consume(&mut self, shutdown: &mut watch::Receiver<bool>) -> WorkerResult<()> {
        // Once every sender is gone the flag can no longer change
        let mut signal_open = true;
        loop {
            if *shutdown.borrow_and_update() {
                info!("Received shutdown signal, stopping worker");
                return Ok(());
            }

            let fetched = tokio::select! {
                biased;
                changed = shutdown.changed(), if signal_open => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped, consuming until the stream ends");
                        signal_open = false;
                    }
                    continue;
                }
                fetched = self.source.next_message(self.config.inactivity_timeout) => fetched?,
            };
            let Some(message) = fetched else {
                continue;
            };

            self.handle_message(message).await?;
        }
    }

    /// Decide and settle one delivery.
    ///
    /// Only a failed ack/nack is returned as an error; processing failures
    /// are expressed as [`Settlement::DeadLettered`].
    pub async fn handle_message(&mut self, message: InboundMessage) -> WorkerResult<Settlement> {
        let started = Instant::now();
        let delivery_tag = message.delivery_tag;
        self.metrics.message_received();

        let settlement = match Self::decide(&self.processor, &message).await {
            Ok(outcome) => {
                self.source.ack(delivery_tag).await?;
                self.metrics
                    .message_acked(outcome.as_str(), started.elapsed());
                Settlement::Acked(outcome)
            }
            Err(reason) => {
                self.source.reject(delivery_tag).await?;
                self.metrics
                    .message_dead_lettered(reason, started.elapsed());
                warn!(delivery_tag, reason, "Moved message to dead-letter queue");
                Settlement::DeadLettered
            }
        };

        debug!(delivery_tag, settlement = ?settlement, "Delivery settled");
        Ok(settlement)
    }

    /// `Ok` to acknowledge, `Err(reason)` to dead-letter.
    ///
    /// Borrows only the processor so the future does not require the message
    /// source to be `Sync`.
    async fn decide(processor: &Arc<P>, message: &InboundMessage) -> Result<JobOutcome, &'static str> {
        let job: J = match serde_json::from_slice(&message.body) {
            Ok(job) => job,
            Err(e) => {
                error!(
                    delivery_tag = message.delivery_tag,
                    error = %e,
                    "Failed to decode message body"
                );
                return Err("decode");
            }
        };

        let job_id = job.job_id();
        debug!(
            job_id = %job_id,
            delivery_tag = message.delivery_tag,
            redelivered = message.redelivered,
            "Processing job"
        );

        match processor.process(&job).await {
            Ok(outcome) => {
                debug!(job_id = %job_id, outcome = outcome.as_str(), "Job processed");
                Ok(outcome)
            }
            Err(e) => {
                error!(
                    job_id = %job_id,
                    processor = %processor.name(),
                    category = e.category().as_str(),
                    error = %e,
                    "Job failed"
                );
                Err("processing")
            }
        }
    }

    fn set_ready(&self, ready: bool) {
        if let Some(flag) = &self.ready {
            flag.store(ready, Ordering::Release);
        }
    }
}
