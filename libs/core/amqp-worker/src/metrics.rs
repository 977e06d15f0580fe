//! Prometheus metrics for queue workers and DLQ replays

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize Prometheus metrics
///
/// Call this once at startup. Subsequent calls are no-ops.
pub fn init_metrics() -> Result<(), BuildError> {
    PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        info!("Prometheus metrics initialized");
        Ok::<_, BuildError>(handle)
    })?;
    Ok(())
}

/// Get the Prometheus handle for rendering metrics
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus format
pub fn render_metrics() -> String {
    get_metrics_handle()
        .map(|h| h.render())
        .unwrap_or_default()
}

/// Queue worker metrics helper
#[derive(Clone)]
pub struct WorkerMetrics {
    queue_name: String,
    processor_name: String,
}

impl WorkerMetrics {
    pub fn new(queue_name: impl Into<String>, processor_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            processor_name: processor_name.into(),
        }
    }

    /// Record a delivery being received
    pub fn message_received(&self) {
        counter!(
            "amqp_worker_messages_received_total",
            "queue" => self.queue_name.clone(),
            "processor" => self.processor_name.clone()
        )
        .increment(1);
    }

    /// Record an acknowledged message and how long it took
    pub fn message_acked(&self, outcome: &'static str, duration: Duration) {
        counter!(
            "amqp_worker_messages_acked_total",
            "queue" => self.queue_name.clone(),
            "processor" => self.processor_name.clone(),
            "outcome" => outcome
        )
        .increment(1);

        self.record_duration(duration);
    }

    /// Record a message rejected to the dead-letter queue
    pub fn message_dead_lettered(&self, reason: &'static str, duration: Duration) {
        counter!(
            "amqp_worker_messages_dead_lettered_total",
            "queue" => self.queue_name.clone(),
            "processor" => self.processor_name.clone(),
            "reason" => reason
        )
        .increment(1);

        self.record_duration(duration);
    }

    fn record_duration(&self, duration: Duration) {
        histogram!(
            "amqp_worker_message_duration_seconds",
            "queue" => self.queue_name.clone(),
            "processor" => self.processor_name.clone()
        )
        .record(duration.as_secs_f64());
    }
}

/// Record a message moved from a DLQ back to its queue
pub fn record_replayed(dlq_name: &str) {
    counter!("amqp_worker_replayed_total", "dlq" => dlq_name.to_string()).increment(1);
}

/// Record a replay run that stopped before draining the DLQ
pub fn record_replay_halted(dlq_name: &str) {
    counter!("amqp_worker_replay_halted_total", "dlq" => dlq_name.to_string()).increment(1);
}
