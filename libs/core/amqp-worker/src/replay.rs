//! Dead-letter queue replay
//!
//! Moves every message in a DLQ back onto its main queue, one at a time. A
//! message is acknowledged on the DLQ only after the broker confirmed the
//! republish, so an interrupted run loses nothing and can simply be re-run.

use crate::channel::ReplayChannel;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::topology::Topology;
use lapin::BasicProperties;
use lapin::types::{FieldTable, ShortString};
use tracing::{error, info};

/// Headers the broker adds when dead-lettering. Left in place they would make
/// a replayed message look like it already died once.
pub const DEAD_LETTER_HEADERS: [&str; 7] = [
    "x-death",
    "x-first-death-exchange",
    "x-first-death-queue",
    "x-first-death-reason",
    "x-last-death-exchange",
    "x-last-death-queue",
    "x-last-death-reason",
];

/// Result of one replay run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Messages in the DLQ when the run started
    pub found: u32,
    /// Messages republished and removed from the DLQ
    pub replayed: u32,
    /// Why the run stopped early, if it did
    pub halted: Option<String>,
}

impl ReplaySummary {
    fn empty() -> Self {
        Self {
            found: 0,
            replayed: 0,
            halted: None,
        }
    }

    /// True when the DLQ was drained without a failure
    pub fn is_complete(&self) -> bool {
        self.halted.is_none()
    }
}

/// Remove dead-letter lineage headers, keeping every other property.
pub fn strip_dead_letter_headers(properties: BasicProperties) -> BasicProperties {
    let Some(headers) = properties.headers().clone() else {
        return properties;
    };

    let mut kept = FieldTable::default();
    for (key, value) in headers.inner() {
        if !DEAD_LETTER_HEADERS.contains(&key.as_str()) {
            kept.insert(ShortString::from(key.as_str()), value.clone());
        }
    }
    properties.with_headers(kept)
}

/// Replays a DLQ into its main queue
pub struct DlqReplayer<C: ReplayChannel> {
    channel: C,
    dlq: String,
    target: String,
}

impl<C: ReplayChannel> DlqReplayer<C> {
    pub fn new(channel: C, topology: &Topology) -> Self {
        Self {
            channel,
            dlq: topology.dlq.clone(),
            target: topology.queue.clone(),
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Drain the DLQ.
    ///
    /// Fails only when the DLQ cannot be inspected. A failure while moving a
    /// message stops the run and is reported in [`ReplaySummary::halted`];
    /// that message stays unacknowledged and returns to the DLQ when the
    /// channel closes.
    pub async fn replay(&self) -> WorkerResult<ReplaySummary> {
        let found = self.channel.message_count(&self.dlq).await?;
        if found == 0 {
            info!(dlq = %self.dlq, "DLQ is empty, nothing to replay");
            return Ok(ReplaySummary::empty());
        }

        info!(dlq = %self.dlq, target = %self.target, found, "Starting DLQ replay");

        let mut summary = ReplaySummary {
            found,
            ..ReplaySummary::empty()
        };

        loop {
            match self.replay_one().await {
                Ok(true) => {
                    summary.replayed += 1;
                    metrics::record_replayed(&self.dlq);
                    info!(replayed = summary.replayed, found, "Replayed message");
                }
                Ok(false) => break,
                Err(e) => {
                    error!(
                        dlq = %self.dlq,
                        replayed = summary.replayed,
                        error = %e,
                        "Replay halted; remaining messages stay in the DLQ"
                    );
                    metrics::record_replay_halted(&self.dlq);
                    summary.halted = Some(e.to_string());
                    break;
                }
            }
        }

        info!(
            dlq = %self.dlq,
            found = summary.found,
            replayed = summary.replayed,
            complete = summary.is_complete(),
            "DLQ replay finished"
        );
        Ok(summary)
    }

    /// Move one message. `Ok(false)` when the DLQ is empty.
    async fn replay_one(&self) -> Result<bool, WorkerError> {
        let Some(message) = self.channel.fetch(&self.dlq).await? else {
            return Ok(false);
        };

        let properties = strip_dead_letter_headers(message.properties);
        self.channel
            .publish(&self.target, &message.body, properties)
            .await?;
        self.channel.ack(message.delivery_tag).await?;
        Ok(true)
    }
}
