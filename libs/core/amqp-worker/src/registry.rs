//! Queue definitions and job payloads.
//!
//! This module provides:
//! - `QueueDef` trait for domain-specific queue topology
//! - `QueueJob` trait for message payloads

use crate::topology::Topology;
use serde::de::DeserializeOwned;

/// Queue definition trait.
///
/// Each domain implements this trait to name its main queue and the
/// dead-letter pair behind it.
///
/// # Example
///
/// ```rust,ignore
/// use amqp_worker::QueueDef;
///
/// pub struct PaymentQueue;
///
/// impl QueueDef for PaymentQueue {
///     const QUEUE_NAME: &'static str = "payment_events";
///     const DLQ_NAME: &'static str = "payment_events.dlq";
///     const DLX_NAME: &'static str = "dlx_payment";
/// }
/// ```
pub trait QueueDef: Send + Sync {
    /// Durable main queue consumed by workers.
    const QUEUE_NAME: &'static str;

    /// Durable queue collecting rejected messages.
    const DLQ_NAME: &'static str;

    /// Direct exchange the main queue dead-letters into.
    const DLX_NAME: &'static str;

    /// Routing key binding the DLQ to the DLX.
    const DLX_ROUTING_KEY: &'static str = "dead_letter";

    /// Full topology for this queue.
    fn topology() -> Topology {
        Topology::new(
            Self::QUEUE_NAME,
            Self::DLQ_NAME,
            Self::DLX_NAME,
            Self::DLX_ROUTING_KEY,
        )
    }
}

/// Trait for queue message payloads.
///
/// Messages arrive as JSON; the worker decodes them into the job type before
/// handing them to a processor.
pub trait QueueJob: DeserializeOwned + Send + Sync {
    /// Business identifier for logging and tracking.
    fn job_id(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestQueue;
    impl QueueDef for TestQueue {
        const QUEUE_NAME: &'static str = "test_events";
        const DLQ_NAME: &'static str = "test_events.dlq";
        const DLX_NAME: &'static str = "dlx_test";
    }

    #[test]
    fn test_queue_def_topology() {
        let topology = TestQueue::topology();
        assert_eq!(topology.queue, "test_events");
        assert_eq!(topology.dlq, "test_events.dlq");
        assert_eq!(topology.dlx, "dlx_test");
        assert_eq!(topology.routing_key, "dead_letter");
    }
}
