//! AMQP Worker Framework
//!
//! A generic RabbitMQ worker framework for processing queued jobs.
//!
//! ## Features
//!
//! - **Dead-letter topology**: main queue, direct DLX and DLQ declared on every connect
//! - **Bounded connect retries**: fixed delay, fatal on bad credentials
//! - **Generic worker**: `QueueWorker<J, P, S>` with prefetch 1 and explicit ack/nack
//! - **Graceful shutdown**: `watch` channel checked between fetches
//! - **DLQ replay**: confirmed republish with lineage headers stripped
//! - **Prometheus metrics** and **health endpoints**
//!
//! ## Example
//!
//! ```ignore
//! use amqp_worker::{AmqpConsumer, BrokerConfig, BrokerConnector, QueueDef, QueueWorker, WorkerConfig};
//!
//! struct PaymentQueue;
//! impl QueueDef for PaymentQueue {
//!     const QUEUE_NAME: &'static str = "payment_events";
//!     const DLQ_NAME: &'static str = "payment_events.dlq";
//!     const DLX_NAME: &'static str = "dlx_payment";
//! }
//!
//! let mut connector = BrokerConnector::from_queue_def::<PaymentQueue>(BrokerConfig::from_env()?);
//! let channel = connector.connect_with_config().await?;
//! let config = WorkerConfig::from_queue_def::<PaymentQueue>();
//! let consumer = AmqpConsumer::start(channel, &config).await?;
//! let mut worker = QueueWorker::new(consumer, processor, config);
//! worker.run(shutdown_rx).await?;
//! connector.close().await?;
//! ```

mod channel;
mod config;
mod connector;
mod error;
mod health;
pub mod metrics;
mod registry;
mod replay;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod topology;
mod worker;

// Re-export main types
pub use channel::{AmqpChannel, AmqpConsumer, InboundMessage, MessageSource, ReplayChannel};
pub use config::{BrokerConfig, WorkerConfig};
pub use connector::BrokerConnector;
pub use error::{ErrorCategory, WorkerError, WorkerResult};
pub use health::{HealthState, health_router};
pub use metrics::{WorkerMetrics, init_metrics};
pub use registry::{QueueDef, QueueJob};
pub use replay::{DEAD_LETTER_HEADERS, DlqReplayer, ReplaySummary, strip_dead_letter_headers};
pub use topology::Topology;
pub use worker::{JobOutcome, JobProcessor, QueueWorker, Settlement};

/// Re-exported so callers can build properties without depending on lapin.
pub use lapin::BasicProperties;
